//! `regiongate-events`: the audit trail.
//!
//! Every authorization decision becomes exactly one [`AuditEvent`]. Events are
//! handed to an [`AuditRecorder`], which appends them to an [`AuditSink`] with
//! bounded retries and writes anything it could not store to the process log.

pub mod csv;
pub mod event;
pub mod filter;
pub mod in_memory_log;
pub mod recorder;
pub mod sink;

pub use event::{AuditEvent, AuditEventType, Severity};
pub use filter::AuditFilter;
pub use in_memory_log::{AuditStats, DEFAULT_AUDIT_CAPACITY, InMemoryAuditLog};
pub use recorder::{
    AUDIT_FALLBACK_TARGET, AppendOutcome, AtomicRecorderStats, AuditRecorder, RecorderStats, RetryPolicy,
    SinkRecorder, append_with_retry, log_fallback,
};
pub use sink::{AuditError, AuditSink};
