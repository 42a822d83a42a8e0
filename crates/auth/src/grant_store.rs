//! Grant storage boundary.
//!
//! Expiry is enforced twice: every read filters by `expires_at`, and
//! [`GrantStore::sweep_expired`] physically removes stale grants. Neither
//! layer depends on the other.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use regiongate_core::{DomainError, GrantId, SubjectId};
use regiongate_geo::{RegionKey, SynonymTable};

use crate::{AccessGrant, GrantSource, RegionScope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantStoreError {
    #[error("grant not found: {0}")]
    NotFound(GrantId),

    #[error("invalid grant: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("grant store unavailable: {0}")]
    Unavailable(String),
}

impl From<DomainError> for GrantStoreError {
    fn from(value: DomainError) -> Self {
        GrantStoreError::Invalid(value.to_string())
    }
}

/// Subject → grants storage with many readers and serialized writers.
///
/// Implementations must apply each write atomically (a failed call leaves no
/// partial change) and keep `sweep_expired` safe alongside concurrent reads.
pub trait GrantStore: Send + Sync {
    /// Validate and store a grant.
    fn insert(&self, grant: AccessGrant) -> Result<GrantId, GrantStoreError>;

    /// Validate and store every grant, or none of them.
    fn insert_all(&self, grants: Vec<AccessGrant>) -> Result<Vec<GrantId>, GrantStoreError>;

    /// Remove one grant by id.
    fn revoke(&self, grant_id: GrantId) -> Result<AccessGrant, GrantStoreError>;

    /// Remove every grant of `subject` matching `predicate`; returns the count.
    ///
    /// Admin bypass grants are never removed here, only by [`GrantStore::revoke`].
    fn revoke_where(
        &self,
        subject: SubjectId,
        predicate: &dyn Fn(&AccessGrant) -> bool,
    ) -> Result<usize, GrantStoreError>;

    /// Move a temporary grant's expiry later.
    fn extend(
        &self,
        grant_id: GrantId,
        new_expires_at: DateTime<Utc>,
    ) -> Result<AccessGrant, GrantStoreError>;

    /// Every stored grant for `subject`, expired ones included.
    fn grants_for(&self, subject: SubjectId) -> Result<Vec<AccessGrant>, GrantStoreError>;

    /// Remove grants with `expires_at <= now`. Idempotent.
    fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, GrantStoreError>;

    /// The key this store files `region` under. Stores that apply synonyms
    /// override this; lookups pass their argument through it.
    fn canonical_region(&self, region: &RegionKey) -> RegionKey {
        region.clone()
    }

    /// Grants in force at `now`.
    fn active_grants(
        &self,
        subject: SubjectId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessGrant>, GrantStoreError> {
        let mut grants = self.grants_for(subject)?;
        grants.retain(|g| g.is_active(now));
        Ok(grants)
    }

    /// Union of permanent, active temporary, and zone-derived regions, or
    /// [`RegionScope::All`] when an admin bypass grant exists.
    fn effective_regions(
        &self,
        subject: SubjectId,
        now: DateTime<Utc>,
    ) -> Result<RegionScope, GrantStoreError> {
        let grants = self.active_grants(subject, now)?;
        if grants.iter().any(|g| g.source == GrantSource::AdminBypass) {
            return Ok(RegionScope::All);
        }
        Ok(RegionScope::only(
            grants.into_iter().filter_map(|g| g.region),
        ))
    }

    fn has_temporary_access(
        &self,
        subject: SubjectId,
        region: &RegionKey,
        now: DateTime<Utc>,
    ) -> Result<bool, GrantStoreError> {
        let region = self.canonical_region(region);
        Ok(self.active_grants(subject, now)?.iter().any(|g| {
            g.source == GrantSource::Temporary
                && g.region
                    .as_ref()
                    .is_some_and(|r| self.canonical_region(r).fuzzy_matches(&region))
        }))
    }

    fn has_admin_bypass(&self, subject: SubjectId, now: DateTime<Utc>) -> Result<bool, GrantStoreError> {
        Ok(self
            .active_grants(subject, now)?
            .iter()
            .any(|g| g.source == GrantSource::AdminBypass))
    }

    /// Remove the subject's non-admin grants for `region` or any of its
    /// synonyms.
    fn revoke_region(&self, subject: SubjectId, region: &RegionKey) -> Result<usize, GrantStoreError> {
        let region = self.canonical_region(region);
        self.revoke_where(subject, &|g| {
            g.region.as_ref().is_some_and(|r| self.canonical_region(r) == region)
        })
    }

    /// Grant every region of `zone` as zone-derived access. One invalid
    /// region rejects the whole assignment.
    fn assign_zone(
        &self,
        subject: SubjectId,
        zone: &str,
        regions: &[RegionKey],
        now: DateTime<Utc>,
    ) -> Result<Vec<GrantId>, GrantStoreError> {
        self.insert_all(
            regions
                .iter()
                .map(|region| AccessGrant::zone_derived(subject, zone, region.clone(), now))
                .collect(),
        )
    }

    fn revoke_zone(&self, subject: SubjectId, zone: &str) -> Result<usize, GrantStoreError> {
        self.revoke_where(subject, &|g| {
            g.source == GrantSource::ZoneDerived && g.zone.as_deref() == Some(zone)
        })
    }
}

impl<S> GrantStore for Arc<S>
where
    S: GrantStore + ?Sized,
{
    fn insert(&self, grant: AccessGrant) -> Result<GrantId, GrantStoreError> {
        (**self).insert(grant)
    }

    fn insert_all(&self, grants: Vec<AccessGrant>) -> Result<Vec<GrantId>, GrantStoreError> {
        (**self).insert_all(grants)
    }

    fn revoke(&self, grant_id: GrantId) -> Result<AccessGrant, GrantStoreError> {
        (**self).revoke(grant_id)
    }

    fn revoke_where(
        &self,
        subject: SubjectId,
        predicate: &dyn Fn(&AccessGrant) -> bool,
    ) -> Result<usize, GrantStoreError> {
        (**self).revoke_where(subject, predicate)
    }

    fn extend(
        &self,
        grant_id: GrantId,
        new_expires_at: DateTime<Utc>,
    ) -> Result<AccessGrant, GrantStoreError> {
        (**self).extend(grant_id, new_expires_at)
    }

    fn grants_for(&self, subject: SubjectId) -> Result<Vec<AccessGrant>, GrantStoreError> {
        (**self).grants_for(subject)
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, GrantStoreError> {
        (**self).sweep_expired(now)
    }

    fn canonical_region(&self, region: &RegionKey) -> RegionKey {
        (**self).canonical_region(region)
    }
}

#[derive(Debug, Default)]
struct Grants {
    by_subject: HashMap<SubjectId, Vec<AccessGrant>>,
    owners: HashMap<GrantId, SubjectId>,
}

/// In-memory grant store for tests/dev and single-process deployments.
///
/// Region keys are stored in canonical form through the synonym table, so
/// "Orissa" and "Odisha" name the same grant region.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    inner: RwLock<Grants>,
    synonyms: SynonymTable,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_synonyms(synonyms: SynonymTable) -> Self {
        Self {
            inner: RwLock::default(),
            synonyms,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Validate a batch and canonicalize its regions.
    fn prepare(&self, grants: Vec<AccessGrant>) -> Result<Vec<AccessGrant>, GrantStoreError> {
        let mut seen = HashSet::with_capacity(grants.len());
        grants
            .into_iter()
            .map(|mut grant| {
                grant.validate()?;
                if !seen.insert(grant.id) {
                    return Err(GrantStoreError::Conflict(format!("grant {} appears twice", grant.id)));
                }
                grant.region = grant.region.map(|r| self.synonyms.canonical(&r));
                Ok(grant)
            })
            .collect()
    }

    fn poisoned() -> GrantStoreError {
        GrantStoreError::Unavailable("lock poisoned".to_string())
    }
}

impl GrantStore for InMemoryGrantStore {
    fn insert(&self, grant: AccessGrant) -> Result<GrantId, GrantStoreError> {
        let ids = self.insert_all(vec![grant])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| GrantStoreError::Invalid("empty insert".to_string()))
    }

    fn insert_all(&self, grants: Vec<AccessGrant>) -> Result<Vec<GrantId>, GrantStoreError> {
        let grants = self.prepare(grants)?;

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        if let Some(dup) = grants.iter().find(|g| inner.owners.contains_key(&g.id)) {
            return Err(GrantStoreError::Conflict(format!("grant {} already exists", dup.id)));
        }

        let mut ids = Vec::with_capacity(grants.len());
        for grant in grants {
            ids.push(grant.id);
            inner.owners.insert(grant.id, grant.subject);
            inner.by_subject.entry(grant.subject).or_default().push(grant);
        }
        Ok(ids)
    }

    fn revoke(&self, grant_id: GrantId) -> Result<AccessGrant, GrantStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let subject = inner
            .owners
            .remove(&grant_id)
            .ok_or(GrantStoreError::NotFound(grant_id))?;

        let grants = inner.by_subject.entry(subject).or_default();
        let pos = grants
            .iter()
            .position(|g| g.id == grant_id)
            .ok_or(GrantStoreError::NotFound(grant_id))?;
        let removed = grants.remove(pos);
        if grants.is_empty() {
            inner.by_subject.remove(&subject);
        }
        Ok(removed)
    }

    fn revoke_where(
        &self,
        subject: SubjectId,
        predicate: &dyn Fn(&AccessGrant) -> bool,
    ) -> Result<usize, GrantStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Grants { by_subject, owners } = &mut *inner;

        let Some(grants) = by_subject.get_mut(&subject) else {
            return Ok(0);
        };
        let before = grants.len();
        grants.retain(|g| {
            let remove = g.source != GrantSource::AdminBypass && predicate(g);
            if remove {
                owners.remove(&g.id);
            }
            !remove
        });
        let removed = before - grants.len();
        if grants.is_empty() {
            by_subject.remove(&subject);
        }
        Ok(removed)
    }

    fn extend(
        &self,
        grant_id: GrantId,
        new_expires_at: DateTime<Utc>,
    ) -> Result<AccessGrant, GrantStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let subject = *inner
            .owners
            .get(&grant_id)
            .ok_or(GrantStoreError::NotFound(grant_id))?;

        let grant = inner
            .by_subject
            .get_mut(&subject)
            .and_then(|grants| grants.iter_mut().find(|g| g.id == grant_id))
            .ok_or(GrantStoreError::NotFound(grant_id))?;

        if grant.source != GrantSource::Temporary {
            return Err(GrantStoreError::Invalid(format!(
                "only temporary grants can be extended, grant {grant_id} is {}",
                grant.source
            )));
        }
        if grant.expires_at.is_some_and(|current| new_expires_at <= current) {
            return Err(GrantStoreError::Conflict(
                "extension must move expires_at later".to_string(),
            ));
        }

        grant.expires_at = Some(new_expires_at);
        Ok(grant.clone())
    }

    fn grants_for(&self, subject: SubjectId) -> Result<Vec<AccessGrant>, GrantStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.by_subject.get(&subject).cloned().unwrap_or_default())
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, GrantStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Grants { by_subject, owners } = &mut *inner;

        let mut removed = 0;
        by_subject.retain(|_, grants| {
            grants.retain(|g| {
                let keep = g.is_active(now);
                if !keep {
                    owners.remove(&g.id);
                    removed += 1;
                }
                keep
            });
            !grants.is_empty()
        });
        Ok(removed)
    }

    fn canonical_region(&self, region: &RegionKey) -> RegionKey {
        self.synonyms.canonical(region)
    }
}
