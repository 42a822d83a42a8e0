//! Recording audit events without ever failing the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, warn};

use crate::sink::{AuditError, AuditSink};
use crate::AuditEvent;

/// Target of the secondary channel that receives events no sink accepted.
pub const AUDIT_FALLBACK_TARGET: &str = "regiongate::audit_fallback";

/// Fire-and-forget audit emission used by the decision engine.
///
/// `record` never fails and never panics. Implementations that cannot
/// persist an event must route it to [`log_fallback`].
pub trait AuditRecorder: Send + Sync {
    fn record(&self, event: AuditEvent);
}

impl<R> AuditRecorder for Arc<R>
where
    R: AuditRecorder + ?Sized,
{
    fn record(&self, event: AuditEvent) {
        (**self).record(event)
    }
}

/// Bounded, fixed-delay retry for sink appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }
}

/// Outcome of [`append_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored { attempts: u32 },
    Failed { attempts: u32, error: AuditError },
}

/// Append `event`, retrying transient failures up to the policy's bound.
/// Rejections are not retried.
pub fn append_with_retry<S>(sink: &S, event: &AuditEvent, policy: RetryPolicy) -> AppendOutcome
where
    S: AuditSink + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match sink.append(event.clone()) {
            Ok(()) => return AppendOutcome::Stored { attempts: attempt },
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(
                    event_id = %event.id,
                    attempt,
                    error = %err,
                    "audit append failed, retrying"
                );
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
            }
            Err(err) => {
                return AppendOutcome::Failed {
                    attempts: attempt,
                    error: err,
                };
            }
        }
    }
}

/// Write an event that could not be stored to the process log.
pub fn log_fallback(event: &AuditEvent, cause: &AuditError) {
    let payload = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"id\":\"{}\",\"serialize_error\":\"{e}\"}}", event.id));
    error!(
        target: AUDIT_FALLBACK_TARGET,
        event_id = %event.id,
        subject = %event.subject,
        error = %cause,
        event = %payload,
        "audit event not persisted"
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub stored: u64,
    pub retries: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Default)]
pub struct AtomicRecorderStats {
    stored: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
}

impl AtomicRecorderStats {
    pub fn observe(&self, outcome: &AppendOutcome) {
        let attempts = match outcome {
            AppendOutcome::Stored { attempts } => {
                self.stored.fetch_add(1, Ordering::Relaxed);
                *attempts
            }
            AppendOutcome::Failed { attempts, .. } => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                *attempts
            }
        };
        self.retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    pub fn fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RecorderStats {
        RecorderStats {
            stored: self.stored.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Synchronous recorder: appends on the caller's thread.
///
/// Suitable when the sink is in-process and cheap. For slow sinks use a
/// queued recorder so decision latency is not tied to the sink.
pub struct SinkRecorder<S> {
    sink: S,
    policy: RetryPolicy,
    stats: AtomicRecorderStats,
}

impl<S: AuditSink> SinkRecorder<S> {
    pub fn new(sink: S) -> Self {
        Self::with_policy(sink, RetryPolicy::default())
    }

    pub fn with_policy(sink: S, policy: RetryPolicy) -> Self {
        Self {
            sink,
            policy,
            stats: AtomicRecorderStats::default(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats.snapshot()
    }
}

impl<S: AuditSink> AuditRecorder for SinkRecorder<S> {
    fn record(&self, event: AuditEvent) {
        let outcome = append_with_retry(&self.sink, &event, self.policy);
        self.stats.observe(&outcome);
        if let AppendOutcome::Failed { error, .. } = outcome {
            log_fallback(&event, &error);
        }
    }
}
