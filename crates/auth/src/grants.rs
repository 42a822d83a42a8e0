use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use regiongate_core::{DomainError, GrantId, SubjectId};
use regiongate_geo::RegionKey;

/// Why a subject holds a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Permanent,
    Temporary,
    ZoneDerived,
    /// Synthetic grant covering every region.
    AdminBypass,
}

impl core::fmt::Display for GrantSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            GrantSource::Permanent => "permanent",
            GrantSource::Temporary => "temporary",
            GrantSource::ZoneDerived => "zone_derived",
            GrantSource::AdminBypass => "admin_bypass",
        })
    }
}

/// A record asserting `subject` may access `region`.
///
/// A subject may hold several grants for one region from different sources;
/// access is the union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: GrantId,
    pub subject: SubjectId,
    /// `None` only for [`GrantSource::AdminBypass`].
    pub region: Option<RegionKey>,
    pub source: GrantSource,
    /// Zone name for zone-derived grants.
    pub zone: Option<String>,
    pub granted_at: DateTime<Utc>,
    /// Mandatory for temporary grants, absent otherwise.
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl AccessGrant {
    fn base(subject: SubjectId, source: GrantSource, granted_at: DateTime<Utc>) -> Self {
        Self {
            id: GrantId::new(),
            subject,
            region: None,
            source,
            zone: None,
            granted_at,
            expires_at: None,
            reason: None,
        }
    }

    pub fn permanent(subject: SubjectId, region: RegionKey, granted_at: DateTime<Utc>) -> Self {
        Self {
            region: Some(region),
            ..Self::base(subject, GrantSource::Permanent, granted_at)
        }
    }

    pub fn temporary(
        subject: SubjectId,
        region: RegionKey,
        granted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            region: Some(region),
            expires_at: Some(expires_at),
            ..Self::base(subject, GrantSource::Temporary, granted_at)
        }
    }

    pub fn zone_derived(
        subject: SubjectId,
        zone: impl Into<String>,
        region: RegionKey,
        granted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            region: Some(region),
            zone: Some(zone.into()),
            ..Self::base(subject, GrantSource::ZoneDerived, granted_at)
        }
    }

    pub fn admin_bypass(subject: SubjectId, granted_at: DateTime<Utc>) -> Self {
        Self::base(subject, GrantSource::AdminBypass, granted_at)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// A grant whose `expires_at <= now` is inactive, swept or not.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Check the source/region/expiry pairing.
    pub fn validate(&self) -> Result<(), DomainError> {
        let region_ok = match self.source {
            GrantSource::AdminBypass => self.region.is_none(),
            _ => self.region.as_ref().is_some_and(|r| !r.is_empty()),
        };
        if !region_ok {
            return Err(DomainError::validation(match self.source {
                GrantSource::AdminBypass => "admin bypass grants cannot name a region",
                _ => "grant must name a non-empty region",
            }));
        }

        match (self.source, self.expires_at) {
            (GrantSource::Temporary, None) => {
                return Err(DomainError::validation("temporary grants require expires_at"));
            }
            // A temporary grant created already expired is valid; it is just never active.
            (GrantSource::Temporary, Some(_)) | (_, None) => {}
            (_, Some(_)) => {
                return Err(DomainError::validation(format!(
                    "{} grants cannot expire",
                    self.source
                )));
            }
        }

        if self.source == GrantSource::ZoneDerived && self.zone.as_deref().is_none_or(str::is_empty) {
            return Err(DomainError::validation("zone-derived grants require a zone"));
        }

        Ok(())
    }
}

/// The set of regions a subject may access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionScope {
    /// Admin bypass: every region.
    All,
    Only(BTreeSet<RegionKey>),
}

impl RegionScope {
    pub fn none() -> Self {
        RegionScope::Only(BTreeSet::new())
    }

    pub fn only(regions: impl IntoIterator<Item = RegionKey>) -> Self {
        RegionScope::Only(regions.into_iter().collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, RegionScope::All)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RegionScope::Only(set) if set.is_empty())
    }

    /// Whether `region` is covered, using the bounded fuzzy name match.
    pub fn covers(&self, region: &RegionKey) -> bool {
        match self {
            RegionScope::All => true,
            RegionScope::Only(set) => set.contains(region) || set.iter().any(|r| r.fuzzy_matches(region)),
        }
    }

    pub fn regions(&self) -> Option<&BTreeSet<RegionKey>> {
        match self {
            RegionScope::All => None,
            RegionScope::Only(set) => Some(set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn temporary_grant_expires_at_its_instant() {
        let now = Utc::now();
        let grant = AccessGrant::temporary(SubjectId::new(), RegionKey::new("Delhi"), now, now + Duration::minutes(5));
        assert!(grant.is_active(now));
        assert!(!grant.is_active(now + Duration::minutes(5)));
    }

    #[test]
    fn validation_enforces_source_pairing() {
        let now = Utc::now();
        let subject = SubjectId::new();

        let mut temp = AccessGrant::temporary(subject, RegionKey::new("Delhi"), now, now);
        temp.expires_at = None;
        assert!(temp.validate().is_err());

        let mut perm = AccessGrant::permanent(subject, RegionKey::new("Goa"), now);
        assert!(perm.validate().is_ok());
        perm.expires_at = Some(now);
        assert!(perm.validate().is_err());

        let mut admin = AccessGrant::admin_bypass(subject, now);
        assert!(admin.validate().is_ok());
        admin.region = Some(RegionKey::new("Goa"));
        assert!(admin.validate().is_err());

        let mut zone = AccessGrant::zone_derived(subject, "west", RegionKey::new("Goa"), now);
        assert!(zone.validate().is_ok());
        zone.zone = None;
        assert!(zone.validate().is_err());
    }

    #[test]
    fn scope_covers_with_fuzzy_names() {
        let scope = RegionScope::only([RegionKey::new("Delhi")]);
        assert!(scope.covers(&RegionKey::new("NCT of Delhi")));
        assert!(!scope.covers(&RegionKey::new("Gujarat")));
        assert!(RegionScope::All.covers(&RegionKey::new("anything")));
        assert!(RegionScope::none().is_empty());
    }
}
