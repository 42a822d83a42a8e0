use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{Effect, Identity, PermissionContext, PermissionId, RuleScope, ScopedRule};

/// Outcome of resolving one permission id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Allowed { via: AllowedVia },
    Denied(PermissionDenial),
}

impl Resolution {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Resolution::Allowed { .. })
    }

    /// Human-readable explanation suitable for direct display.
    pub fn reason(&self) -> String {
        match self {
            Resolution::Allowed {
                via: AllowedVia::AdminBypass,
            } => "Granted by admin bypass".to_string(),
            Resolution::Allowed {
                via: AllowedVia::Rule { pattern, scope },
            } => format!("Granted by rule '{pattern}' ({scope})"),
            Resolution::Denied(denial) => denial.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedVia {
    AdminBypass,
    Rule { pattern: String, scope: RuleScope },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDenialKind {
    NoRule,
    ExplicitDeny,
    ConditionFailed,
    /// The permission id itself could not be parsed.
    InvalidPermission,
}

impl core::fmt::Display for PermissionDenialKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            PermissionDenialKind::NoRule => "no_rule",
            PermissionDenialKind::ExplicitDeny => "explicit_deny",
            PermissionDenialKind::ConditionFailed => "condition_failed",
            PermissionDenialKind::InvalidPermission => "invalid_permission",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenial {
    pub kind: PermissionDenialKind,
    pub reason: String,
    /// The deciding rule's pattern, when one exists.
    pub pattern: Option<String>,
}

impl PermissionDenial {
    pub fn invalid_permission(raw: &str, err: impl core::fmt::Display) -> Self {
        Self {
            kind: PermissionDenialKind::InvalidPermission,
            reason: format!("Invalid permission '{raw}': {err}"),
            pattern: None,
        }
    }
}

/// Evaluates wildcard rules with deny-over-grant precedence.
///
/// Resolution order:
/// 1. admin identity: allowed
/// 2. any matching deny rule whose conditions hold: denied
/// 3. any matching grant rule whose conditions hold: allowed
/// 4. otherwise denied (`ConditionFailed` if some rule matched, else `NoRule`)
///
/// Stateless; callers supply the rule set and the clock reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        identity: &Identity,
        permission: &PermissionId,
        rules: &[ScopedRule],
        ctx: &PermissionContext,
        now: DateTime<Utc>,
    ) -> Resolution {
        if identity.is_admin {
            return Resolution::Allowed {
                via: AllowedVia::AdminBypass,
            };
        }

        let mut best_deny: Option<&ScopedRule> = None;
        let mut best_grant: Option<&ScopedRule> = None;
        let mut first_failure: Option<(&ScopedRule, String)> = None;

        for scoped in rules.iter().filter(|r| r.rule.pattern.matches(permission)) {
            let failed = scoped
                .rule
                .conditions
                .iter()
                .find_map(|c| c.evaluate(identity.subject, ctx, now).err());

            if let Some(message) = failed {
                first_failure.get_or_insert((scoped, message));
                continue;
            }

            let slot = match scoped.rule.effect {
                Effect::Deny => &mut best_deny,
                Effect::Grant => &mut best_grant,
            };
            // Strictly more specific replaces; ties keep the earlier rule.
            if slot.is_none_or(|cur| scoped.rule.pattern.specificity() > cur.rule.pattern.specificity()) {
                *slot = Some(scoped);
            }
        }

        if let Some(deny) = best_deny {
            debug!(
                subject = %identity.subject,
                permission = %permission,
                pattern = %deny.rule.pattern,
                "explicit deny rule applied"
            );
            return Resolution::Denied(PermissionDenial {
                kind: PermissionDenialKind::ExplicitDeny,
                reason: format!(
                    "Denied by rule '{}' ({}) for '{}'",
                    deny.rule.pattern, deny.scope, permission
                ),
                pattern: Some(deny.rule.pattern.to_string()),
            });
        }

        if let Some(grant) = best_grant {
            return Resolution::Allowed {
                via: AllowedVia::Rule {
                    pattern: grant.rule.pattern.to_string(),
                    scope: grant.scope.clone(),
                },
            };
        }

        match first_failure {
            Some((rule, message)) => Resolution::Denied(PermissionDenial {
                kind: PermissionDenialKind::ConditionFailed,
                reason: format!(
                    "Rule '{}' ({}) does not apply to '{}': {}",
                    rule.rule.pattern, rule.scope, permission, message
                ),
                pattern: Some(rule.rule.pattern.to_string()),
            }),
            None => Resolution::Denied(PermissionDenial {
                kind: PermissionDenialKind::NoRule,
                reason: format!("No applicable rule for '{permission}'"),
                pattern: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GroupName, PermissionCondition, PermissionRule};
    use proptest::prelude::*;
    use regiongate_core::SubjectId;

    fn direct(rule: PermissionRule) -> ScopedRule {
        ScopedRule {
            scope: RuleScope::Direct,
            rule,
        }
    }

    fn id(s: &str) -> PermissionId {
        PermissionId::parse(s).unwrap()
    }

    fn resolve(identity: &Identity, perm: &str, rules: &[ScopedRule]) -> Resolution {
        PermissionResolver::new().resolve(identity, &id(perm), rules, &PermissionContext::new(), Utc::now())
    }

    #[test]
    fn specific_deny_beats_broad_grant() {
        let user = Identity::user(SubjectId::new());
        let rules = vec![
            direct(PermissionRule::grant("gis.*.use").unwrap()),
            direct(PermissionRule::grant("gis.*").unwrap()),
            direct(PermissionRule::deny("gis.distance.delete.any").unwrap()),
        ];

        let denied = resolve(&user, "gis.distance.delete.any", &rules);
        let Resolution::Denied(denial) = denied else {
            panic!("expected denial");
        };
        assert_eq!(denial.kind, PermissionDenialKind::ExplicitDeny);
        assert_eq!(denial.pattern.as_deref(), Some("gis.distance.delete.any"));

        assert!(resolve(&user, "gis.distance.use", &rules).is_allowed());
    }

    #[test]
    fn grant_reason_names_most_specific_rule() {
        let user = Identity::user(SubjectId::new()).with_group("surveyors");
        let rules = vec![
            ScopedRule {
                scope: RuleScope::Group(GroupName::new("surveyors")),
                rule: PermissionRule::grant("gis.*").unwrap(),
            },
            direct(PermissionRule::grant("gis.area.use").unwrap()),
        ];
        let res = resolve(&user, "gis.area.use", &rules);
        assert_eq!(res.reason(), "Granted by rule 'gis.area.use' (direct)");
    }

    #[test]
    fn no_matching_rule_is_denied() {
        let user = Identity::user(SubjectId::new());
        let rules = vec![direct(PermissionRule::grant("reports.*").unwrap())];
        let res = resolve(&user, "gis.area.use", &rules);
        assert_eq!(res.reason(), "No applicable rule for 'gis.area.use'");
        assert!(matches!(res, Resolution::Denied(PermissionDenial { kind: PermissionDenialKind::NoRule, .. })));
    }

    #[test]
    fn failed_conditions_make_rules_inapplicable() {
        let user = Identity::user(SubjectId::new());
        let owner_only = PermissionCondition::OwnerOnly { allow_team: false };

        // A deny whose condition fails does not block a plain grant.
        let rules = vec![
            direct(PermissionRule::deny("gis.*").unwrap().with_condition(owner_only.clone())),
            direct(PermissionRule::grant("gis.*").unwrap()),
        ];
        assert!(resolve(&user, "gis.area.use", &rules).is_allowed());

        let only_conditional = vec![direct(PermissionRule::grant("gis.*").unwrap().with_condition(owner_only))];
        let res = resolve(&user, "gis.area.use", &only_conditional);
        let Resolution::Denied(denial) = res else {
            panic!("expected denial");
        };
        assert_eq!(denial.kind, PermissionDenialKind::ConditionFailed);
        assert!(denial.reason.contains("resource owner is unknown"));
    }

    #[test]
    fn conditions_short_circuit_on_first_failure() {
        let user = Identity::user(SubjectId::new());
        let rule = PermissionRule::grant("gis.*")
            .unwrap()
            .with_condition(PermissionCondition::Quota {
                max_per_day: Some(0),
                max_per_month: None,
            })
            .with_condition(PermissionCondition::OwnerOnly { allow_team: false });
        let res = resolve(&user, "gis.x", &[direct(rule)]);
        assert!(res.reason().contains("daily quota of 0 reached"));
        assert!(!res.reason().contains("owner"));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z]{1,6}"
    }

    fn permission_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(segment(), 1..5)
    }

    /// A pattern derived from `segments` that is guaranteed to match them.
    fn matching_pattern(segments: &[String], mask: &[bool], trailing: bool) -> String {
        let mut parts: Vec<String> = segments
            .iter()
            .zip(mask.iter().chain(std::iter::repeat(&false)))
            .map(|(s, wild)| if *wild { "*".to_string() } else { s.clone() })
            .collect();
        if trailing && parts.len() > 1 {
            parts.truncate(parts.len() - 1);
            parts.push("*".to_string());
        }
        parts.join(".")
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256, .. ProptestConfig::default()
        })]

        #[test]
        fn deny_always_wins_over_grant(
            segments in permission_strategy(),
            grant_mask in prop::collection::vec(any::<bool>(), 5),
            deny_mask in prop::collection::vec(any::<bool>(), 5),
            grant_trailing in any::<bool>(),
            deny_trailing in any::<bool>(),
            deny_first in any::<bool>(),
        ) {
            let perm = id(&segments.join("."));
            let grant = direct(PermissionRule::grant(&matching_pattern(&segments, &grant_mask, grant_trailing)).unwrap());
            let deny = direct(PermissionRule::deny(&matching_pattern(&segments, &deny_mask, deny_trailing)).unwrap());
            prop_assert!(grant.rule.pattern.matches(&perm));
            prop_assert!(deny.rule.pattern.matches(&perm));

            let rules = if deny_first { vec![deny, grant] } else { vec![grant, deny] };
            let user = Identity::user(SubjectId::new());
            let res = PermissionResolver::new().resolve(&user, &perm, &rules, &PermissionContext::new(), Utc::now());
            prop_assert!(
                matches!(res, Resolution::Denied(PermissionDenial { kind: PermissionDenialKind::ExplicitDeny, .. })),
                "expected explicit deny, got {:?}", res
            );
        }

        #[test]
        fn admin_is_always_allowed(
            segments in permission_strategy(),
            deny_everything in any::<bool>(),
        ) {
            let perm = id(&segments.join("."));
            let rules = if deny_everything {
                vec![direct(PermissionRule::deny("*").unwrap())]
            } else {
                Vec::new()
            };
            let admin = Identity::admin(SubjectId::new());
            let res = PermissionResolver::new().resolve(&admin, &perm, &rules, &PermissionContext::new(), Utc::now());
            prop_assert_eq!(res, Resolution::Allowed { via: AllowedVia::AdminBypass });
        }
    }
}
