//! `regiongate-engine`: the authorization decision engine.
//!
//! Two entry points, [`DecisionEngine::authorize_region_access`] and
//! [`DecisionEngine::authorize_permission`], each return a [`Decision`] and
//! record exactly one audit event.

pub mod decision;
pub mod engine;

pub use decision::{ALL_REGIONS_ADMIN, AccessKind, Decision, DenialCode};
pub use engine::DecisionEngine;
