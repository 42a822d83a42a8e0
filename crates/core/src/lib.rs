//! `regiongate-core`: shared primitives for the access control engine.
//!
//! Identifiers, the domain error model, and the clock abstraction. No IO.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use id::{AuditEventId, GrantId, SubjectId};
