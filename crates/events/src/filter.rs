//! Audit query filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use regiongate_core::SubjectId;

use crate::{AuditEvent, AuditEventType, Severity};

/// Filter criteria for audit queries. Every `None` field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub subject: Option<SubjectId>,
    pub event_type: Option<AuditEventType>,
    pub severity: Option<Severity>,
    pub success: Option<bool>,
    /// Inclusive lower bound on `timestamp`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `timestamp`.
    pub to: Option<DateTime<Utc>>,
    /// Keep at most this many of the newest matches.
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: SubjectId) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.subject.is_none_or(|s| s == event.subject)
            && self.event_type.is_none_or(|t| t == event.event_type)
            && self.severity.is_none_or(|s| s == event.severity)
            && self.success.is_none_or(|s| s == event.success)
            && self.from.is_none_or(|from| event.timestamp >= from)
            && self.to.is_none_or(|to| event.timestamp < to)
    }
}
