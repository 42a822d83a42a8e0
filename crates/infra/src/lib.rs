//! Infrastructure layer: configuration, boundary loading, background workers,
//! and runtime wiring.

pub mod audit_emitter;
pub mod boundaries;
pub mod config;
pub mod runtime;
pub mod sweeper;


pub use audit_emitter::{DEFAULT_QUEUE_CAPACITY, QueuedAuditEmitter};
pub use boundaries::{build_region_index, load_region_index};
pub use config::EngineConfig;
pub use runtime::EngineRuntime;
pub use sweeper::{GrantSweeper, GrantSweeperHandle, SweeperStats};
