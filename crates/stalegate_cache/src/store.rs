use std::sync::Arc;

use dashmap::DashMap;

use crate::entry::CacheEntry;
use crate::key::CacheKey;

/// Process-wide key -> entry map.
///
/// No eviction and no expiry: an entry lives until a newer fetch for the same
/// key replaces it. Reads hand out `Arc`s, so a reader keeps a consistent
/// entry even if a refresh swaps it a moment later.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    inner: DashMap<CacheKey, Arc<CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.inner.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or replace. Returns the entry that was displaced, if any.
    pub fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) -> Option<Arc<CacheEntry>> {
        self.inner.insert(key, entry)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
