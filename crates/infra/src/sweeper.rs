//! Periodic removal of expired grants.
//!
//! Reads already filter by expiry, so the sweep only reclaims storage; a late
//! or failed sweep never turns into a stale allow.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use regiongate_auth::{GrantStore, GrantStoreError};
use regiongate_core::Clock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweeperStats {
    pub runs: u64,
    pub removed: u64,
    pub failures: u64,
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct GrantSweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl GrantSweeperHandle {
    /// Stop the sweeper and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SweeperStats {
        lock_stats(&self.stats).clone()
    }
}

impl Drop for GrantSweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_stats(stats: &Mutex<SweeperStats>) -> std::sync::MutexGuard<'_, SweeperStats> {
    match stats.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Background task calling [`GrantStore::sweep_expired`] on an interval.
pub struct GrantSweeper {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl GrantSweeper {
    /// `interval` is clamped to at least one millisecond.
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Run one sweep on the caller's thread.
    pub fn sweep_once(&self) -> Result<usize, GrantStoreError> {
        self.store.sweep_expired(self.clock.now())
    }

    /// Spawn the sweeper in a background thread.
    pub fn spawn(self) -> std::io::Result<GrantSweeperHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name("grant-sweeper".to_string())
            .spawn(move || sweeper_loop(self, shutdown_rx, stats_clone))?;

        Ok(GrantSweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn sweeper_loop(sweeper: GrantSweeper, shutdown_rx: mpsc::Receiver<()>, stats: Arc<Mutex<SweeperStats>>) {
    info!(interval_secs = sweeper.interval.as_secs_f64(), "grant sweeper started");

    loop {
        match shutdown_rx.recv_timeout(sweeper.interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let result = sweeper.sweep_once();
        let mut s = lock_stats(&stats);
        s.runs += 1;
        match result {
            Ok(removed) => {
                s.removed += removed as u64;
                if removed > 0 {
                    debug!(removed, "expired grants swept");
                }
            }
            Err(e) => {
                s.failures += 1;
                error!(error = %e, "grant sweep failed");
            }
        }
    }

    info!("grant sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use regiongate_auth::{AccessGrant, InMemoryGrantStore};
    use regiongate_core::{ManualClock, SubjectId};
    use regiongate_geo::RegionKey;

    #[test]
    fn sweep_once_removes_only_expired_grants() {
        let store = InMemoryGrantStore::arc();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let subject = SubjectId::new();
        let now = clock.now();
        store
            .insert(AccessGrant::temporary(subject, RegionKey::new("Delhi"), now, now + ChronoDuration::minutes(5)))
            .unwrap();
        store
            .insert(AccessGrant::permanent(subject, RegionKey::new("Goa"), now))
            .unwrap();

        let sweeper = GrantSweeper::new(store.clone(), clock.clone(), Duration::from_secs(30));
        assert_eq!(sweeper.sweep_once().unwrap(), 0);

        clock.advance(ChronoDuration::minutes(5));
        assert_eq!(sweeper.sweep_once().unwrap(), 1);
        assert_eq!(store.grants_for(subject).unwrap().len(), 1);
    }

    #[test]
    fn background_sweeper_runs_until_shutdown() {
        let store = InMemoryGrantStore::arc();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let subject = SubjectId::new();
        let past = clock.now() - ChronoDuration::minutes(1);
        store
            .insert(AccessGrant::temporary(subject, RegionKey::new("Delhi"), past, past))
            .unwrap();

        let handle = GrantSweeper::new(store.clone(), clock, Duration::from_millis(5))
            .spawn()
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.stats().removed == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let stats = handle.stats();
        handle.shutdown();
        assert_eq!(stats.removed, 1);
        assert!(stats.runs >= 1);
        assert!(store.grants_for(subject).unwrap().is_empty());
    }
}
