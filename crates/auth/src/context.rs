use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regiongate_core::SubjectId;
use regiongate_geo::RegionKey;

use crate::RegionScope;

/// Usage counters supplied by the caller for quota conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub today: u32,
    pub this_month: u32,
}

/// Request context a permission check is evaluated against.
///
/// Every field is optional; a condition that needs a missing field fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionContext {
    /// Region the action targets (already normalized).
    pub region: Option<RegionKey>,
    /// The subject's effective regions. Filled by the decision engine when absent.
    pub assigned_regions: Option<RegionScope>,
    pub resource_owner: Option<SubjectId>,
    /// Subjects sharing a team with the caller.
    pub team: Vec<SubjectId>,
    pub usage: Usage,
    /// Free-form attributes copied into the audit record.
    pub attributes: BTreeMap<String, String>,
}

impl PermissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: RegionKey) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_assigned_regions(mut self, scope: RegionScope) -> Self {
        self.assigned_regions = Some(scope);
        self
    }

    pub fn with_owner(mut self, owner: SubjectId) -> Self {
        self.resource_owner = Some(owner);
        self
    }

    pub fn with_team_member(mut self, member: SubjectId) -> Self {
        self.team.push(member);
        self
    }

    pub fn with_usage(mut self, today: u32, this_month: u32) -> Self {
        self.usage = Usage { today, this_month };
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
