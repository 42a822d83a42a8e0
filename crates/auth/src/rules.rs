//! Permission rules and their storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use regiongate_core::SubjectId;

use crate::{GroupName, Identity, PatternError, PermissionCondition, PermissionPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Grant,
    Deny,
}

/// A compiled pattern with an effect and the conditions that must all hold
/// for the rule to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub pattern: PermissionPattern,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Vec<PermissionCondition>,
}

impl PermissionRule {
    pub fn new(pattern: PermissionPattern, effect: Effect) -> Self {
        Self {
            pattern,
            effect,
            conditions: Vec::new(),
        }
    }

    pub fn grant(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self::new(PermissionPattern::compile(pattern)?, Effect::Grant))
    }

    pub fn deny(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self::new(PermissionPattern::compile(pattern)?, Effect::Deny))
    }

    pub fn with_condition(mut self, condition: PermissionCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Where a rule came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Direct,
    Group(GroupName),
}

impl core::fmt::Display for RuleScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RuleScope::Direct => f.write_str("direct"),
            RuleScope::Group(group) => write!(f, "group '{group}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedRule {
    pub scope: RuleScope,
    pub rule: PermissionRule,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleStoreError {
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Per-subject and per-group rule sets.
pub trait RuleStore: Send + Sync {
    /// Direct rules first, then each group's rules in the identity's group order.
    fn rules_for(&self, identity: &Identity) -> Result<Vec<ScopedRule>, RuleStoreError>;

    fn add_subject_rule(&self, subject: SubjectId, rule: PermissionRule) -> Result<(), RuleStoreError>;

    fn add_group_rule(&self, group: GroupName, rule: PermissionRule) -> Result<(), RuleStoreError>;

    /// Remove every direct rule of `subject`; returns the count.
    fn clear_subject(&self, subject: SubjectId) -> Result<usize, RuleStoreError>;

    fn clear_group(&self, group: &GroupName) -> Result<usize, RuleStoreError>;
}

impl<S> RuleStore for Arc<S>
where
    S: RuleStore + ?Sized,
{
    fn rules_for(&self, identity: &Identity) -> Result<Vec<ScopedRule>, RuleStoreError> {
        (**self).rules_for(identity)
    }

    fn add_subject_rule(&self, subject: SubjectId, rule: PermissionRule) -> Result<(), RuleStoreError> {
        (**self).add_subject_rule(subject, rule)
    }

    fn add_group_rule(&self, group: GroupName, rule: PermissionRule) -> Result<(), RuleStoreError> {
        (**self).add_group_rule(group, rule)
    }

    fn clear_subject(&self, subject: SubjectId) -> Result<usize, RuleStoreError> {
        (**self).clear_subject(subject)
    }

    fn clear_group(&self, group: &GroupName) -> Result<usize, RuleStoreError> {
        (**self).clear_group(group)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    subjects: RwLock<HashMap<SubjectId, Vec<PermissionRule>>>,
    groups: RwLock<HashMap<GroupName, Vec<PermissionRule>>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn poisoned() -> RuleStoreError {
        RuleStoreError::Unavailable("lock poisoned".to_string())
    }
}

impl RuleStore for InMemoryRuleStore {
    fn rules_for(&self, identity: &Identity) -> Result<Vec<ScopedRule>, RuleStoreError> {
        let subjects = self.subjects.read().map_err(|_| Self::poisoned())?;
        let groups = self.groups.read().map_err(|_| Self::poisoned())?;

        let direct = subjects
            .get(&identity.subject)
            .into_iter()
            .flatten()
            .map(|rule| ScopedRule {
                scope: RuleScope::Direct,
                rule: rule.clone(),
            });

        let inherited = identity.groups.iter().flat_map(|group| {
            groups.get(group).into_iter().flatten().map(move |rule| ScopedRule {
                scope: RuleScope::Group(group.clone()),
                rule: rule.clone(),
            })
        });

        Ok(direct.chain(inherited).collect())
    }

    fn add_subject_rule(&self, subject: SubjectId, rule: PermissionRule) -> Result<(), RuleStoreError> {
        let mut subjects = self.subjects.write().map_err(|_| Self::poisoned())?;
        subjects.entry(subject).or_default().push(rule);
        Ok(())
    }

    fn add_group_rule(&self, group: GroupName, rule: PermissionRule) -> Result<(), RuleStoreError> {
        let mut groups = self.groups.write().map_err(|_| Self::poisoned())?;
        groups.entry(group).or_default().push(rule);
        Ok(())
    }

    fn clear_subject(&self, subject: SubjectId) -> Result<usize, RuleStoreError> {
        let mut subjects = self.subjects.write().map_err(|_| Self::poisoned())?;
        Ok(subjects.remove(&subject).map_or(0, |rules| rules.len()))
    }

    fn clear_group(&self, group: &GroupName) -> Result<usize, RuleStoreError> {
        let mut groups = self.groups.write().map_err(|_| Self::poisoned())?;
        Ok(groups.remove(group).map_or(0, |rules| rules.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_for_orders_direct_then_groups() {
        let store = InMemoryRuleStore::new();
        let subject = SubjectId::new();
        let identity = Identity::user(subject).with_group("surveyors").with_group("analysts");

        store
            .add_group_rule(GroupName::new("analysts"), PermissionRule::grant("reports.*").unwrap())
            .unwrap();
        store
            .add_group_rule(GroupName::new("surveyors"), PermissionRule::grant("gis.*").unwrap())
            .unwrap();
        store
            .add_group_rule(GroupName::new("unrelated"), PermissionRule::deny("*").unwrap())
            .unwrap();
        store
            .add_subject_rule(subject, PermissionRule::deny("gis.area.use").unwrap())
            .unwrap();

        let rules = store.rules_for(&identity).unwrap();
        let seen: Vec<(String, &str)> = rules
            .iter()
            .map(|r| (r.scope.to_string(), r.rule.pattern.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("direct".to_string(), "gis.area.use"),
                ("group 'surveyors'".to_string(), "gis.*"),
                ("group 'analysts'".to_string(), "reports.*"),
            ]
        );
    }

    #[test]
    fn clearing_removes_only_that_scope() {
        let store = InMemoryRuleStore::new();
        let subject = SubjectId::new();
        store.add_subject_rule(subject, PermissionRule::grant("a.b").unwrap()).unwrap();
        store.add_subject_rule(subject, PermissionRule::grant("a.c").unwrap()).unwrap();
        store
            .add_group_rule(GroupName::new("g"), PermissionRule::grant("a.*").unwrap())
            .unwrap();

        assert_eq!(store.clear_subject(subject).unwrap(), 2);
        assert_eq!(store.clear_subject(subject).unwrap(), 0);

        let rules = store.rules_for(&Identity::user(subject).with_group("g")).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(store.clear_group(&GroupName::new("g")).unwrap(), 1);
    }

    #[test]
    fn rules_deserialize_with_conditions() {
        let json = r#"{
            "pattern": "gis.*.use",
            "effect": "grant",
            "conditions": [{"type": "owner_only", "allow_team": true}]
        }"#;
        let rule: PermissionRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.effect, Effect::Grant);
        assert_eq!(rule.conditions.len(), 1);
    }
}
