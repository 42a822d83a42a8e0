//! Audit sink abstraction (storage mechanics only).
//!
//! A sink is where audit events finally land: an in-memory ring, a database
//! table, a log shipper. The engine never talks to a sink directly; it goes
//! through an [`AuditRecorder`](crate::AuditRecorder), which owns retries and
//! the fallback channel.
//!
//! ## Contract
//!
//! - **Append-only**: events are never updated; only a retention policy may
//!   drop them (oldest first).
//! - **Atomic appends**: a failed append leaves no partial record behind, so a
//!   retry cannot duplicate half an event.
//! - **Concurrent writers**: `append` takes `&self` and must be safe to call
//!   from many threads.

use std::sync::Arc;

use thiserror::Error;

use crate::AuditEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// Transient; worth retrying.
    #[error("audit sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Permanent for this event; retrying will not help.
    #[error("audit event rejected: {0}")]
    Rejected(String),
}

impl AuditError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditError::SinkUnavailable(_))
    }
}

pub trait AuditSink: Send + Sync {
    fn append(&self, event: AuditEvent) -> Result<(), AuditError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).append(event)
    }
}
