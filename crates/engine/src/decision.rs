use serde::Serialize;

use regiongate_auth::PermissionDenialKind;
use regiongate_core::AuditEventId;
use regiongate_geo::RegionKey;

/// Region label used when an admin is allowed without a located region.
pub const ALL_REGIONS_ADMIN: &str = "All Regions (Admin)";

/// How an allowed request was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Admin,
    /// Permanent assignment or zone-derived grant.
    Permanent,
    Temporary,
    /// Denied requests, and permission checks allowed by a rule.
    None,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Admin => "admin",
            AccessKind::Permanent => "permanent",
            AccessKind::Temporary => "temporary",
            AccessKind::None => "none",
        }
    }
}

impl core::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCode {
    RegionUndetermined,
    NoRegionsAssigned,
    RegionNotAuthorized,
    PermissionDenied(PermissionDenialKind),
    /// Grants could not be read; the engine fails closed.
    GrantStoreUnavailable,
    RuleStoreUnavailable,
}

impl core::fmt::Display for DenialCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DenialCode::RegionUndetermined => f.write_str("region_undetermined"),
            DenialCode::NoRegionsAssigned => f.write_str("no_regions_assigned"),
            DenialCode::RegionNotAuthorized => f.write_str("region_not_authorized"),
            DenialCode::PermissionDenied(kind) => write!(f, "permission_denied.{kind}"),
            DenialCode::GrantStoreUnavailable => f.write_str("grant_store_unavailable"),
            DenialCode::RuleStoreUnavailable => f.write_str("rule_store_unavailable"),
        }
    }
}

/// The engine's verdict for one request, paired with exactly one audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub region: Option<RegionKey>,
    /// Display name of `region`, or [`ALL_REGIONS_ADMIN`].
    pub region_name: Option<String>,
    pub access_kind: AccessKind,
    /// Human-readable, suitable for direct display.
    pub reason: String,
    pub denial: Option<DenialCode>,
    pub audit_id: AuditEventId,
}

impl Decision {
    pub fn is_denied_with(&self, code: DenialCode) -> bool {
        self.denial == Some(code)
    }
}
