//! Process-level wiring: stores, audit pipeline, sweeper, and the engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use regiongate_auth::{GrantStoreError, InMemoryGrantStore, InMemoryRuleStore};
use regiongate_core::{Clock, SystemClock};
use regiongate_engine::DecisionEngine;
use regiongate_events::{InMemoryAuditLog, RecorderStats};
use regiongate_geo::{RegionIndex, SharedRegionIndex, SynonymTable};

use crate::audit_emitter::QueuedAuditEmitter;
use crate::boundaries::load_region_index;
use crate::config::EngineConfig;
use crate::sweeper::{GrantSweeper, GrantSweeperHandle, SweeperStats};

/// A running engine with in-memory stores and its background threads.
///
/// Dropping the runtime stops the threads; [`EngineRuntime::shutdown`] also
/// flushes queued audit events first.
pub struct EngineRuntime {
    config: EngineConfig,
    synonyms: SynonymTable,
    clock: Arc<dyn Clock>,
    regions: Arc<SharedRegionIndex>,
    grants: Arc<InMemoryGrantStore>,
    rules: Arc<InMemoryRuleStore>,
    audit_log: Arc<InMemoryAuditLog>,
    emitter: Arc<QueuedAuditEmitter>,
    sweeper: Option<GrantSweeperHandle>,
    engine: DecisionEngine,
}

impl EngineRuntime {
    /// Install process logging in the configured format, then start with the
    /// default synonym table and the system clock.
    pub fn start(config: EngineConfig) -> anyhow::Result<Self> {
        regiongate_observability::init_with(config.log_format);
        Self::start_with(config, SynonymTable::default(), Arc::new(SystemClock))
    }

    /// Start with an explicit synonym table and clock.
    ///
    /// A configured boundary file that cannot be loaded is fatal. Without a
    /// configured file the index starts empty.
    pub fn start_with(config: EngineConfig, synonyms: SynonymTable, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let index = match &config.boundary_path {
            Some(path) => load_region_index(path, &config, synonyms.clone())?,
            None => {
                warn!("no boundary dataset configured; every location is undetermined until a reload");
                RegionIndex::builder(synonyms.clone())
                    .with_fallback_radius_km(config.fallback_radius_km)
                    .build()
            }
        };
        let regions = Arc::new(SharedRegionIndex::new(index));

        let grants = Arc::new(InMemoryGrantStore::with_synonyms(synonyms.clone()));
        let rules = InMemoryRuleStore::arc();
        let audit_log = Arc::new(InMemoryAuditLog::new(config.audit_capacity));
        let emitter = Arc::new(
            QueuedAuditEmitter::spawn(audit_log.clone(), config.audit_retry_policy(), config.audit_queue_capacity)
                .context("failed to spawn audit emitter")?,
        );

        let sweeper = GrantSweeper::new(grants.clone(), clock.clone(), config.sweep_interval)
            .spawn()
            .context("failed to spawn grant sweeper")?;

        let engine = DecisionEngine::new(regions.clone(), grants.clone(), rules.clone(), emitter.clone())
            .with_clock(clock.clone());

        info!(
            regions = regions.snapshot().len(),
            audit_capacity = config.audit_capacity,
            fallback_radius_km = config.fallback_radius_km,
            "engine runtime started"
        );

        Ok(Self {
            config,
            synonyms,
            clock,
            regions,
            grants,
            rules,
            audit_log,
            emitter,
            sweeper: Some(sweeper),
            engine,
        })
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grants(&self) -> &Arc<InMemoryGrantStore> {
        &self.grants
    }

    pub fn rules(&self) -> &Arc<InMemoryRuleStore> {
        &self.rules
    }

    pub fn audit_log(&self) -> &Arc<InMemoryAuditLog> {
        &self.audit_log
    }

    /// Wait until every audit event recorded so far has reached the log.
    pub fn flush_audit(&self) -> bool {
        self.emitter.flush()
    }

    pub fn audit_stats(&self) -> RecorderStats {
        self.emitter.stats()
    }

    pub fn sweeper_stats(&self) -> SweeperStats {
        self.sweeper.as_ref().map(GrantSweeperHandle::stats).unwrap_or_default()
    }

    /// Load a new boundary dataset and swap it in. On error the current index
    /// stays in place.
    pub fn reload_boundaries(&self, path: &Path) -> anyhow::Result<usize> {
        let index = load_region_index(path, &self.config, self.synonyms.clone())?;
        Ok(self.replace_index(index))
    }

    /// Swap in a prebuilt index; returns its region count.
    pub fn replace_index(&self, index: RegionIndex) -> usize {
        let count = index.len();
        let previous = self.regions.replace(index);
        info!(previous = previous.len(), current = count, "region index replaced");
        count
    }

    /// Remove expired grants now instead of waiting for the sweeper.
    pub fn sweep_now(&self) -> Result<usize, GrantStoreError> {
        GrantSweeper::new(self.grants.clone(), self.clock.clone(), self.config.sweep_interval).sweep_once()
    }

    pub fn shutdown(mut self) {
        self.emitter.flush();
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown();
        }
        self.emitter.shutdown();
        info!("engine runtime stopped");
    }
}
