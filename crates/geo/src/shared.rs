use std::sync::{Arc, RwLock};

use crate::RegionIndex;

/// Atomically swappable handle to the current [`RegionIndex`].
///
/// Readers take an `Arc` snapshot and run lookups without holding the lock,
/// so a reload never blocks or tears an in-flight `locate`.
#[derive(Debug)]
pub struct SharedRegionIndex {
    current: RwLock<Arc<RegionIndex>>,
}

impl SharedRegionIndex {
    pub fn new(index: RegionIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn snapshot(&self) -> Arc<RegionIndex> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install a new index, returning the previous one.
    pub fn replace(&self, index: RegionIndex) -> Arc<RegionIndex> {
        let next = Arc::new(index);
        match self.current.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

impl Default for SharedRegionIndex {
    fn default() -> Self {
        Self::new(RegionIndex::empty())
    }
}
