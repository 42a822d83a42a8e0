//! The decision engine: geodetection + grants + rules → one audited verdict.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use regiongate_auth::{
    AccessGrant, AllowedVia, GrantSource, GrantStore, GrantStoreError, Identity, PermissionContext,
    PermissionDenial, PermissionDenialKind, PermissionId, PermissionResolver, RegionScope, Resolution,
    RuleStore,
};
use regiongate_core::{Clock, SubjectId, SystemClock};
use regiongate_events::{AuditEvent, AuditEventType, AuditRecorder, Severity};
use regiongate_geo::{LatLng, RegionIndex, RegionKey, SharedRegionIndex, SynonymTable};

use crate::{ALL_REGIONS_ADMIN, AccessKind, Decision, DenialCode};

/// Verdict under construction; becomes a [`Decision`] once audited.
#[derive(Debug)]
struct Verdict {
    allowed: bool,
    region: Option<RegionKey>,
    region_name: Option<String>,
    access_kind: AccessKind,
    reason: String,
    denial: Option<DenialCode>,
    severity: Severity,
    context: BTreeMap<String, String>,
}

impl Verdict {
    fn allow(access_kind: AccessKind, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            region: None,
            region_name: None,
            access_kind,
            reason: reason.into(),
            denial: None,
            severity: Severity::Info,
            context: BTreeMap::new(),
        }
    }

    fn deny(code: DenialCode, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            access_kind: AccessKind::None,
            denial: Some(code),
            severity: Severity::Warning,
            ..Self::allow(AccessKind::None, reason)
        }
    }

    fn critical(mut self) -> Self {
        self.severity = Severity::Critical;
        self
    }

    fn in_region(mut self, key: &RegionKey, name: impl Into<String>) -> Self {
        self.region = Some(key.clone());
        self.region_name = Some(name.into());
        self
    }

    fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Orchestrates the region index, grant store, and permission rules into one
/// authorization verdict, recording exactly one audit event per call.
///
/// The engine holds no mutable state of its own; it is `Send + Sync` and may
/// be shared freely across threads.
pub struct DecisionEngine {
    regions: Arc<SharedRegionIndex>,
    grants: Arc<dyn GrantStore>,
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditRecorder>,
    clock: Arc<dyn Clock>,
    resolver: PermissionResolver,
}

impl DecisionEngine {
    pub fn new(
        regions: Arc<SharedRegionIndex>,
        grants: Arc<dyn GrantStore>,
        rules: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            regions,
            grants,
            rules,
            audit,
            clock: Arc::new(SystemClock),
            resolver: PermissionResolver::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn regions(&self) -> &Arc<SharedRegionIndex> {
        &self.regions
    }

    /// May `identity` act at `point` right now?
    pub fn authorize_region_access(&self, identity: &Identity, point: LatLng) -> Decision {
        let now = self.clock.now();
        let index = self.regions.snapshot();

        let verdict = self
            .region_verdict(identity, point, &index, now)
            .with_context("lat", point.lat.to_string())
            .with_context("lng", point.lng.to_string());

        self.finish(identity.subject, AuditEventType::RegionAccess, now, verdict)
    }

    /// May `identity` perform `permission` in `ctx` right now?
    ///
    /// `ctx.region` is canonicalized through the synonym table, and
    /// `ctx.assigned_regions` is filled from the grant store when absent.
    pub fn authorize_permission(&self, identity: &Identity, permission: &str, mut ctx: PermissionContext) -> Decision {
        let now = self.clock.now();
        let index = self.regions.snapshot();
        let synonyms = index.synonyms();

        ctx.region = ctx.region.map(|r| synonyms.canonical(&r));
        ctx.assigned_regions = ctx.assigned_regions.map(|scope| match scope {
            RegionScope::Only(keys) => canonical_scope(synonyms, keys.iter()),
            all => all,
        });

        let mut verdict = match PermissionId::parse(permission) {
            Ok(id) => self.permission_verdict(identity, &id, &mut ctx, synonyms, now),
            Err(err) => {
                let denial = PermissionDenial::invalid_permission(permission, err);
                Verdict::deny(DenialCode::PermissionDenied(denial.kind), denial.reason)
            }
        };

        if let Some(region) = &ctx.region {
            verdict = verdict.in_region(region, index.display_name(region));
        }
        for (key, value) in &ctx.attributes {
            verdict = verdict.with_context(&format!("attr.{key}"), value.clone());
        }
        let verdict = verdict.with_context("permission", permission);

        self.finish(identity.subject, AuditEventType::PermissionCheck, now, verdict)
    }

    /// The subject's effective regions with canonical keys, for UI
    /// highlighting.
    pub fn effective_regions(&self, subject: SubjectId) -> Result<RegionScope, GrantStoreError> {
        let scope = self.grants.effective_regions(subject, self.clock.now())?;
        let index = self.regions.snapshot();
        Ok(match &scope {
            RegionScope::All => scope,
            RegionScope::Only(keys) => canonical_scope(index.synonyms(), keys.iter()),
        })
    }

    fn region_verdict(&self, identity: &Identity, point: LatLng, index: &RegionIndex, now: DateTime<Utc>) -> Verdict {
        let location = index.locate(point);
        let located = location.region();

        let grants = if identity.is_admin {
            Vec::new()
        } else {
            match self.grants.active_grants(identity.subject, now) {
                Ok(grants) => grants,
                Err(err) => {
                    warn!(subject = %identity.subject, error = %err, "grant store unavailable, denying");
                    let verdict = Verdict::deny(
                        DenialCode::GrantStoreUnavailable,
                        "Access could not be verified: grant store unavailable",
                    )
                    .critical();
                    return match located {
                        Some(key) => verdict.in_region(key, index.display_name(key)),
                        None => verdict,
                    };
                }
            }
        };

        let is_admin = identity.is_admin || grants.iter().any(|g| g.source == GrantSource::AdminBypass);
        if is_admin {
            return match located {
                Some(key) => {
                    let name = index.display_name(key);
                    Verdict::allow(AccessKind::Admin, format!("Admin access granted to {name}"))
                        .in_region(key, name)
                        .with_context("exact", location.is_exact().to_string())
                }
                None => {
                    let mut verdict = Verdict::allow(AccessKind::Admin, "Admin access granted (region undetermined)");
                    verdict.region_name = Some(ALL_REGIONS_ADMIN.to_string());
                    verdict
                }
            };
        }

        let Some(located) = located else {
            return Verdict::deny(
                DenialCode::RegionUndetermined,
                format!("Cannot determine region for location {point}"),
            );
        };
        let name = index.display_name(located);

        let assigned: Vec<(RegionKey, GrantSource)> = grants
            .iter()
            .filter_map(|g| g.region.as_ref().map(|r| (index.synonyms().canonical(r), g.source)))
            .collect();

        let verdict = if assigned.is_empty() {
            Verdict::deny(DenialCode::NoRegionsAssigned, "No regions assigned to user")
        } else {
            match matched_access(&assigned, located) {
                Some(AccessKind::Temporary) => Verdict::allow(
                    AccessKind::Temporary,
                    format!("Access granted to {name} (Temporary Access)"),
                ),
                Some(kind) => Verdict::allow(kind, format!("Access granted to {name}")),
                None => {
                    let assigned_names: BTreeSet<String> =
                        assigned.iter().map(|(key, _)| index.display_name(key)).collect();
                    Verdict::deny(
                        DenialCode::RegionNotAuthorized,
                        format!(
                            "Access denied: location is in {name}; assigned regions: {}",
                            assigned_names.into_iter().collect::<Vec<_>>().join(", ")
                        ),
                    )
                }
            }
        };

        verdict
            .in_region(located, name)
            .with_context("exact", location.is_exact().to_string())
    }

    fn permission_verdict(
        &self,
        identity: &Identity,
        permission: &PermissionId,
        ctx: &mut PermissionContext,
        synonyms: &SynonymTable,
        now: DateTime<Utc>,
    ) -> Verdict {
        let mut effective = identity.clone();

        if identity.is_admin {
            ctx.assigned_regions.get_or_insert(RegionScope::All);
        } else {
            let grants = match self.grants.active_grants(identity.subject, now) {
                Ok(grants) => grants,
                Err(err) => {
                    warn!(subject = %identity.subject, error = %err, "grant store unavailable, denying");
                    return Verdict::deny(
                        DenialCode::GrantStoreUnavailable,
                        "Permission could not be verified: grant store unavailable",
                    )
                    .critical();
                }
            };
            if grants.iter().any(|g| g.source == GrantSource::AdminBypass) {
                effective = identity.elevated();
            }
            if ctx.assigned_regions.is_none() {
                ctx.assigned_regions = Some(scope_from_grants(synonyms, &grants));
            }
        }

        let rules = if effective.is_admin {
            Vec::new()
        } else {
            match self.rules.rules_for(&effective) {
                Ok(rules) => rules,
                Err(err) => {
                    warn!(subject = %identity.subject, error = %err, "rule store unavailable, denying");
                    return Verdict::deny(
                        DenialCode::RuleStoreUnavailable,
                        "Permission could not be verified: rule store unavailable",
                    )
                    .critical();
                }
            }
        };

        let resolution = self.resolver.resolve(&effective, permission, &rules, ctx, now);
        let reason = resolution.reason();
        match resolution {
            Resolution::Allowed {
                via: AllowedVia::AdminBypass,
            } => Verdict::allow(AccessKind::Admin, reason),
            Resolution::Allowed {
                via: AllowedVia::Rule { pattern, .. },
            } => Verdict::allow(AccessKind::None, reason).with_context("rule", pattern),
            Resolution::Denied(denial) => {
                let mut verdict = Verdict::deny(DenialCode::PermissionDenied(denial.kind), reason);
                if denial.kind == PermissionDenialKind::ExplicitDeny {
                    verdict = verdict.critical();
                }
                match denial.pattern {
                    Some(pattern) => verdict.with_context("rule", pattern),
                    None => verdict,
                }
            }
        }
    }

    fn finish(&self, subject: SubjectId, event_type: AuditEventType, now: DateTime<Utc>, verdict: Verdict) -> Decision {
        let Verdict {
            allowed,
            region,
            region_name,
            access_kind,
            reason,
            denial,
            severity,
            context,
        } = verdict;

        let mut event = AuditEvent::new(subject, event_type, now, allowed, reason.clone())
            .with_severity(severity)
            .with_region(region.clone())
            .with_context("access_kind", access_kind.as_str());
        event.context.extend(context);
        if let Some(code) = denial {
            event = event.with_context("denial", code.to_string());
        }
        let audit_id = event.id;

        debug!(
            subject = %subject,
            event_type = %event_type,
            allowed,
            access_kind = %access_kind,
            region = ?region,
            denial = ?denial,
            "authorization decided"
        );
        self.audit.record(event);

        Decision {
            allowed,
            region,
            region_name,
            access_kind,
            reason,
            denial,
            audit_id,
        }
    }
}

/// Permanent/zone-derived access outranks temporary access to the same region.
fn matched_access(assigned: &[(RegionKey, GrantSource)], located: &RegionKey) -> Option<AccessKind> {
    let mut kind = None;
    for (key, source) in assigned {
        if !key.fuzzy_matches(located) {
            continue;
        }
        match source {
            GrantSource::Permanent | GrantSource::ZoneDerived => return Some(AccessKind::Permanent),
            GrantSource::Temporary => kind = Some(AccessKind::Temporary),
            GrantSource::AdminBypass => {}
        }
    }
    kind
}

fn canonical_scope<'a>(synonyms: &SynonymTable, keys: impl Iterator<Item = &'a RegionKey>) -> RegionScope {
    RegionScope::only(keys.map(|k| synonyms.canonical(k)))
}

fn scope_from_grants(synonyms: &SynonymTable, grants: &[AccessGrant]) -> RegionScope {
    if grants.iter().any(|g| g.source == GrantSource::AdminBypass) {
        return RegionScope::All;
    }
    canonical_scope(synonyms, grants.iter().filter_map(|g| g.region.as_ref()))
}
