//! Engine configuration, read from `REGIONGATE_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use regiongate_events::{DEFAULT_AUDIT_CAPACITY, RetryPolicy};
use regiongate_geo::DEFAULT_FALLBACK_RADIUS_KM;
use regiongate_observability::LogFormat;

use crate::audit_emitter::DEFAULT_QUEUE_CAPACITY;

pub const ENV_FALLBACK_RADIUS_KM: &str = "REGIONGATE_FALLBACK_RADIUS_KM";
pub const ENV_AUDIT_CAPACITY: &str = "REGIONGATE_AUDIT_CAPACITY";
pub const ENV_AUDIT_QUEUE_CAPACITY: &str = "REGIONGATE_AUDIT_QUEUE_CAPACITY";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "REGIONGATE_SWEEP_INTERVAL_SECS";
pub const ENV_AUDIT_RETRY_ATTEMPTS: &str = "REGIONGATE_AUDIT_RETRY_ATTEMPTS";
pub const ENV_AUDIT_RETRY_DELAY_MS: &str = "REGIONGATE_AUDIT_RETRY_DELAY_MS";
pub const ENV_BOUNDARY_PATH: &str = "REGIONGATE_BOUNDARY_PATH";
pub const ENV_BOUNDARY_NAME_PROPERTY: &str = "REGIONGATE_BOUNDARY_NAME_PROPERTY";
pub const ENV_LOG_FORMAT: &str = "REGIONGATE_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum centroid distance for the border fallback.
    pub fallback_radius_km: f64,
    /// Audit events retained before oldest-first eviction.
    pub audit_capacity: usize,
    /// Audit events waiting for the sink before new ones go to the fallback
    /// log.
    pub audit_queue_capacity: usize,
    /// How often expired grants are physically removed. Never zero.
    pub sweep_interval: Duration,
    /// Total append attempts per audit event, including the first.
    pub audit_retry_attempts: u32,
    pub audit_retry_delay: Duration,
    /// Boundary dataset loaded at startup. Without one every location is
    /// undetermined until a reload.
    pub boundary_path: Option<PathBuf>,
    /// GeoJSON feature property holding the region name.
    pub boundary_name_property: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_radius_km: DEFAULT_FALLBACK_RADIUS_KM,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            audit_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval: Duration::from_secs(30),
            audit_retry_attempts: 3,
            audit_retry_delay: Duration::from_millis(50),
            boundary_path: None,
            boundary_name_property: "name".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Read the process environment. Unparsable values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let radius = parsed(&lookup, ENV_FALLBACK_RADIUS_KM, defaults.fallback_radius_km);
        let sweep_secs = parsed(&lookup, ENV_SWEEP_INTERVAL_SECS, defaults.sweep_interval.as_secs());

        Self {
            fallback_radius_km: if radius.is_finite() && radius >= 0.0 {
                radius
            } else {
                warn!(key = ENV_FALLBACK_RADIUS_KM, value = radius, "negative or non-finite radius; using default");
                defaults.fallback_radius_km
            },
            audit_capacity: parsed(&lookup, ENV_AUDIT_CAPACITY, defaults.audit_capacity),
            audit_queue_capacity: parsed(&lookup, ENV_AUDIT_QUEUE_CAPACITY, defaults.audit_queue_capacity),
            sweep_interval: if sweep_secs > 0 {
                Duration::from_secs(sweep_secs)
            } else {
                warn!(key = ENV_SWEEP_INTERVAL_SECS, "sweep interval must be positive; using default");
                defaults.sweep_interval
            },
            audit_retry_attempts: parsed(&lookup, ENV_AUDIT_RETRY_ATTEMPTS, defaults.audit_retry_attempts),
            audit_retry_delay: Duration::from_millis(parsed(
                &lookup,
                ENV_AUDIT_RETRY_DELAY_MS,
                defaults.audit_retry_delay.as_millis() as u64,
            )),
            boundary_path: lookup(ENV_BOUNDARY_PATH)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            boundary_name_property: lookup(ENV_BOUNDARY_NAME_PROPERTY)
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.boundary_name_property),
            log_format: parsed(&lookup, ENV_LOG_FORMAT, defaults.log_format),
        }
    }

    pub fn with_fallback_radius_km(mut self, radius_km: f64) -> Self {
        self.fallback_radius_km = radius_km;
        self
    }

    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    pub fn with_audit_queue_capacity(mut self, capacity: usize) -> Self {
        self.audit_queue_capacity = capacity;
        self
    }

    /// Set the sweep interval; a zero interval keeps the current one.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(current = ?self.sweep_interval, "sweep interval must be positive; keeping current");
        } else {
            self.sweep_interval = interval;
        }
        self
    }

    pub fn with_audit_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.audit_retry_attempts = attempts;
        self.audit_retry_delay = delay;
        self
    }

    pub fn with_boundary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.boundary_path = Some(path.into());
        self
    }

    pub fn with_boundary_name_property(mut self, property: impl Into<String>) -> Self {
        self.boundary_name_property = property.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn audit_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.audit_retry_attempts, self.audit_retry_delay)
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Debug,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|err| {
            warn!(key, value = %raw, error = %err, default = ?default, "invalid config value; using default");
            default
        }),
    }
}
