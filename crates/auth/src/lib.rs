//! `regiongate-auth`: grants, permission rules, and rule resolution.
//!
//! This crate is decoupled from transport and storage technology: stores are
//! traits with in-memory reference implementations, and resolution is a pure
//! function of its inputs.

pub mod conditions;
pub mod context;
pub mod grant_store;
pub mod grants;
pub mod identity;
pub mod pattern;
pub mod permissions;
pub mod resolver;
pub mod rules;

pub use conditions::{PermissionCondition, TimeWindow};
pub use context::{PermissionContext, Usage};
pub use grant_store::{GrantStore, GrantStoreError, InMemoryGrantStore};
pub use grants::{AccessGrant, GrantSource, RegionScope};
pub use identity::{GroupName, Identity};
pub use pattern::{PatternError, PermissionPattern};
pub use permissions::PermissionId;
pub use resolver::{AllowedVia, PermissionDenial, PermissionDenialKind, PermissionResolver, Resolution};
pub use rules::{Effect, InMemoryRuleStore, PermissionRule, RuleScope, RuleStore, RuleStoreError, ScopedRule};
