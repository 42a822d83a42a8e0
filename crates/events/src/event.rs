use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use regiongate_core::{AuditEventId, SubjectId};
use regiongate_geo::RegionKey;

/// Which entry point produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RegionAccess,
    PermissionCheck,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RegionAccess => "region_access",
            AuditEventType::PermissionCheck => "permission_check",
        }
    }
}

impl core::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one authorization decision.
///
/// Events are facts: they are created once by the decision engine and only
/// ever removed by retention eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub timestamp: DateTime<Utc>,
    pub subject: SubjectId,
    pub event_type: AuditEventType,
    pub severity: Severity,
    /// Absent when the region could not be determined.
    pub region: Option<RegionKey>,
    pub success: bool,
    pub reason: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(
        subject: SubjectId,
        event_type: AuditEventType,
        timestamp: DateTime<Utc>,
        success: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEventId::new(),
            timestamp,
            subject,
            event_type,
            severity: if success { Severity::Info } else { Severity::Warning },
            region: None,
            success,
            reason: reason.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_region(mut self, region: Option<RegionKey>) -> Self {
        self.region = region;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}
