//! In-memory, size-bounded audit log.

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::Serialize;

use crate::sink::{AuditError, AuditSink};
use crate::{AuditEvent, AuditEventType, AuditFilter, csv};

pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub retained: usize,
    pub capacity: usize,
    /// Events dropped by the retention cap since creation.
    pub evicted: u64,
    pub allowed: usize,
    pub denied: usize,
    pub region_access: usize,
    pub permission_checks: usize,
}

#[derive(Debug)]
struct Ring {
    events: VecDeque<AuditEvent>,
    evicted: u64,
}

/// Append-only ring of audit events with oldest-first eviction.
///
/// - O(1) amortized append
/// - Queries copy matches out under a read lock, so they see a consistent
///   snapshot and hold the lock only while filtering
#[derive(Debug)]
pub struct InMemoryAuditLog {
    capacity: usize,
    ring: RwLock<Ring>,
}

impl InMemoryAuditLog {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: RwLock::new(Ring {
                events: VecDeque::with_capacity(capacity.min(1024)),
                evicted: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn poisoned() -> AuditError {
        AuditError::SinkUnavailable("audit log lock poisoned".to_string())
    }

    pub fn len(&self) -> Result<usize, AuditError> {
        Ok(self.ring.read().map_err(|_| Self::poisoned())?.events.len())
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }

    /// Matching events in append order. With a `limit`, only the newest
    /// `limit` matches are returned (still oldest first).
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        let ring = self.ring.read().map_err(|_| Self::poisoned())?;
        let matched = match filter.limit {
            Some(limit) => {
                let mut newest: Vec<AuditEvent> = ring
                    .events
                    .iter()
                    .rev()
                    .filter(|e| filter.matches(e))
                    .take(limit)
                    .cloned()
                    .collect();
                newest.reverse();
                newest
            }
            None => ring.events.iter().filter(|e| filter.matches(e)).cloned().collect(),
        };
        Ok(matched)
    }

    pub fn export_csv(&self, filter: &AuditFilter) -> Result<Vec<u8>, AuditError> {
        Ok(csv::to_csv(&self.query(filter)?))
    }

    pub fn stats(&self) -> Result<AuditStats, AuditError> {
        let ring = self.ring.read().map_err(|_| Self::poisoned())?;
        let mut stats = AuditStats {
            retained: ring.events.len(),
            capacity: self.capacity,
            evicted: ring.evicted,
            ..AuditStats::default()
        };
        for event in &ring.events {
            if event.success {
                stats.allowed += 1;
            } else {
                stats.denied += 1;
            }
            match event.event_type {
                AuditEventType::RegionAccess => stats.region_access += 1,
                AuditEventType::PermissionCheck => stats.permission_checks += 1,
            }
        }
        Ok(stats)
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut ring = self.ring.write().map_err(|_| Self::poisoned())?;
        while ring.events.len() >= self.capacity {
            ring.events.pop_front();
            ring.evicted += 1;
        }
        ring.events.push_back(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use chrono::{Duration, Utc};
    use regiongate_core::SubjectId;

    fn event(subject: SubjectId, success: bool, reason: &str) -> AuditEvent {
        AuditEvent::new(subject, AuditEventType::RegionAccess, Utc::now(), success, reason)
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let log = InMemoryAuditLog::new(3);
        let subject = SubjectId::new();
        for i in 0..5 {
            log.append(event(subject, true, &format!("e{i}"))).unwrap();
        }

        let reasons: Vec<String> = log
            .query(&AuditFilter::new())
            .unwrap()
            .into_iter()
            .map(|e| e.reason)
            .collect();
        assert_eq!(reasons, vec!["e2", "e3", "e4"]);

        let stats = log.stats().unwrap();
        assert_eq!(stats.retained, 3);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn query_filters_and_limits_to_newest() {
        let log = InMemoryAuditLog::new(100);
        let alice = SubjectId::new();
        let bob = SubjectId::new();
        log.append(event(alice, true, "a1")).unwrap();
        log.append(event(bob, false, "b1")).unwrap();
        log.append(event(alice, false, "a2")).unwrap();
        log.append(event(alice, false, "a3").with_severity(Severity::Critical))
            .unwrap();

        let denied_alice = log
            .query(&AuditFilter::new().subject(alice).success(false))
            .unwrap();
        assert_eq!(denied_alice.len(), 2);

        let newest = log.query(&AuditFilter::new().subject(alice).limit(2)).unwrap();
        let reasons: Vec<&str> = newest.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["a2", "a3"]);

        let critical = log.query(&AuditFilter::new().severity(Severity::Critical)).unwrap();
        assert_eq!(critical.len(), 1);
    }

    #[test]
    fn time_range_is_half_open() {
        let log = InMemoryAuditLog::new(10);
        let subject = SubjectId::new();
        let t0 = Utc::now();
        for minutes in 0..3 {
            log.append(AuditEvent::new(
                subject,
                AuditEventType::PermissionCheck,
                t0 + Duration::minutes(minutes),
                true,
                "ok",
            ))
            .unwrap();
        }
        let window = AuditFilter::new().between(t0, t0 + Duration::minutes(2));
        assert_eq!(log.query(&window).unwrap().len(), 2);
    }

    #[test]
    fn export_csv_has_header_plus_matches() {
        let log = InMemoryAuditLog::default();
        let subject = SubjectId::new();
        log.append(event(subject, true, "ok")).unwrap();
        log.append(event(subject, false, "no")).unwrap();

        let bytes = log.export_csv(&AuditFilter::new().success(false)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
