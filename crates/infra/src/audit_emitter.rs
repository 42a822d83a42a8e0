//! Queued audit emission with a background drain thread.
//!
//! `record` only enqueues, so a slow or failing sink never adds latency to an
//! authorization decision. The queue is bounded: when it is full, or once the
//! emitter has shut down, the event goes straight to the fallback log. The
//! drain thread appends with bounded retries and writes events it could not
//! store to the same fallback channel.

use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use regiongate_events::{
    AppendOutcome, AtomicRecorderStats, AuditError, AuditEvent, AuditRecorder, AuditSink, RecorderStats,
    RetryPolicy, append_with_retry, log_fallback,
};

/// Queue slots used when no capacity is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

enum Command {
    Record(AuditEvent),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Non-blocking [`AuditRecorder`] backed by a single drain thread.
pub struct QueuedAuditEmitter {
    tx: Mutex<Option<mpsc::SyncSender<Command>>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
    stats: Arc<AtomicRecorderStats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl QueuedAuditEmitter {
    /// Spawn the drain thread over `sink` with room for `capacity` queued
    /// commands.
    pub fn spawn<S>(sink: S, policy: RetryPolicy, capacity: usize) -> std::io::Result<Self>
    where
        S: AuditSink + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<Command>(capacity.max(1));
        let stats = Arc::new(AtomicRecorderStats::default());
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name("audit-emitter".to_string())
            .spawn(move || drain_loop(sink, policy, rx, stats_clone))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
            stats,
        })
    }

    /// Block until every event enqueued before this call has been handled.
    ///
    /// Returns `false` if the emitter has shut down.
    pub fn flush(&self) -> bool {
        self.flush_timeout(Duration::MAX)
    }

    /// Like [`QueuedAuditEmitter::flush`], but gives up waiting for the
    /// acknowledgement after `timeout`. Enqueueing the barrier itself waits for
    /// queue space.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        let Some(tx) = lock(&self.tx).clone() else {
            return false;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(Command::Flush(ack_tx)).is_err() {
            return false;
        }
        drop(tx);
        if timeout == Duration::MAX {
            ack_rx.recv().is_ok()
        } else {
            ack_rx.recv_timeout(timeout).is_ok()
        }
    }

    /// Drain the queue and stop the thread. Later `record` calls go to the
    /// fallback log.
    pub fn shutdown(&self) {
        // Taking the sender first orders every accepted record before the
        // shutdown marker.
        let tx = lock(&self.tx).take();
        if let Some(tx) = tx {
            let _ = tx.send(Command::Shutdown);
        }
        let join = lock(&self.join).take();
        if let Some(join) = join {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats.snapshot()
    }
}

impl AuditRecorder for QueuedAuditEmitter {
    fn record(&self, event: AuditEvent) {
        let guard = lock(&self.tx);
        let rejected = match guard.as_ref() {
            None => Some((event, "audit emitter stopped")),
            Some(tx) => match tx.try_send(Command::Record(event)) {
                Ok(()) => None,
                Err(mpsc::TrySendError::Full(Command::Record(event))) => Some((event, "audit queue full")),
                Err(mpsc::TrySendError::Disconnected(Command::Record(event))) => {
                    Some((event, "audit emitter stopped"))
                }
                Err(_) => None,
            },
        };
        drop(guard);

        if let Some((event, cause)) = rejected {
            self.stats.fallback();
            log_fallback(&event, &AuditError::SinkUnavailable(cause.to_string()));
        }
    }
}

impl Drop for QueuedAuditEmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn store<S: AuditSink>(sink: &S, policy: RetryPolicy, stats: &AtomicRecorderStats, event: AuditEvent) {
    let outcome = append_with_retry(sink, &event, policy);
    stats.observe(&outcome);
    match outcome {
        AppendOutcome::Stored { attempts } if attempts > 1 => {
            debug!(event_id = %event.id, attempts, "audit event stored after retry");
        }
        AppendOutcome::Stored { .. } => {}
        AppendOutcome::Failed { error, .. } => log_fallback(&event, &error),
    }
}

fn drain_loop<S: AuditSink>(
    sink: S,
    policy: RetryPolicy,
    rx: mpsc::Receiver<Command>,
    stats: Arc<AtomicRecorderStats>,
) {
    info!("audit emitter started");

    for command in rx.iter() {
        match command {
            Command::Record(event) => store(&sink, policy, &stats, event),
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }

    // Commands queued behind the shutdown marker are still handled.
    let mut late = 0usize;
    for command in rx.try_iter() {
        match command {
            Command::Record(event) => {
                late += 1;
                store(&sink, policy, &stats, event);
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => {}
        }
    }

    info!(late, "audit emitter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use regiongate_core::SubjectId;
    use regiongate_events::{AuditEventType, AuditFilter, InMemoryAuditLog};

    fn event() -> AuditEvent {
        AuditEvent::new(SubjectId::new(), AuditEventType::PermissionCheck, Utc::now(), true, "ok")
    }

    #[derive(Default)]
    struct DownSink {
        calls: AtomicU32,
    }

    impl AuditSink for DownSink {
        fn append(&self, _: AuditEvent) -> Result<(), AuditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AuditError::SinkUnavailable("disk full".to_string()))
        }
    }

    /// Holds every append until the gate sender is dropped.
    struct GateSink {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl AuditSink for GateSink {
        fn append(&self, _: AuditEvent) -> Result<(), AuditError> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(())
        }
    }

    fn gate() -> (GateSink, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = GateSink {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (sink, entered_rx, release_tx)
    }

    #[test]
    fn flush_waits_for_queued_events() {
        let log = Arc::new(InMemoryAuditLog::new(100));
        let emitter = QueuedAuditEmitter::spawn(log.clone(), RetryPolicy::no_retry(), 64).unwrap();
        for _ in 0..25 {
            emitter.record(event());
        }
        assert!(emitter.flush());
        assert_eq!(log.query(&AuditFilter::new()).unwrap().len(), 25);
        assert_eq!(emitter.stats().stored, 25);
    }

    #[test]
    fn failing_sink_is_retried_then_falls_back() {
        let sink = Arc::new(DownSink::default());
        let emitter =
            QueuedAuditEmitter::spawn(sink.clone(), RetryPolicy::fixed(3, Duration::ZERO), DEFAULT_QUEUE_CAPACITY)
                .unwrap();
        emitter.record(event());
        assert!(emitter.flush());

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        let stats = emitter.stats();
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.retries, 2);
    }

    #[test]
    fn records_after_shutdown_go_to_fallback() {
        let log = Arc::new(InMemoryAuditLog::new(10));
        let emitter = QueuedAuditEmitter::spawn(log.clone(), RetryPolicy::no_retry(), 8).unwrap();
        emitter.record(event());
        emitter.shutdown();

        emitter.record(event());
        assert!(!emitter.flush());
        assert_eq!(log.len().unwrap(), 1);
        assert_eq!(emitter.stats().fallbacks, 1);
    }

    #[test]
    fn full_queue_falls_back_without_blocking() {
        let (sink, entered, release) = gate();
        let emitter = QueuedAuditEmitter::spawn(sink, RetryPolicy::no_retry(), 1).unwrap();

        emitter.record(event());
        entered.recv().unwrap();
        emitter.record(event());
        emitter.record(event());

        // The third event found the single slot taken while the sink is stuck.
        assert_eq!(emitter.stats().fallbacks, 1);
        assert_eq!(emitter.stats().stored, 0);

        drop(release);
        assert!(emitter.flush());
        let stats = emitter.stats();
        assert_eq!(stats.stored, 2);
        assert_eq!(stats.fallbacks, 1);
    }

    #[test]
    fn event_recorded_during_shutdown_is_stored_or_logged() {
        let (sink, entered, release) = gate();
        let emitter = Arc::new(QueuedAuditEmitter::spawn(sink, RetryPolicy::no_retry(), 16).unwrap());

        emitter.record(event());
        entered.recv().unwrap();

        let stopping = {
            let emitter = emitter.clone();
            thread::spawn(move || emitter.shutdown())
        };
        emitter.record(event());

        drop(release);
        stopping.join().unwrap();

        let stats = emitter.stats();
        assert_eq!(stats.stored + stats.fallbacks, 2, "{stats:?}");
        assert!(!emitter.flush());
    }
}
