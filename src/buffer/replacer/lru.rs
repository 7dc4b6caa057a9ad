//! LRU (Least Recently Used) replacement policy.
//!
//! Tracks recency for every entry in the [`PageCache`](crate::buffer::PageCache).
//! Each touch stamps the entry with a monotonically increasing tick; the
//! victim is the entry with the smallest tick.

use std::collections::{BTreeMap, HashMap};

use crate::buffer::CacheKey;

/// Recency bookkeeping for the page cache.
///
/// All operations are `O(log n)`.
pub struct LruReplacer {
    /// Last access tick per entry.
    last_access: HashMap<CacheKey, u64>,

    /// Entries ordered by last access (first = least recently used).
    by_recency: BTreeMap<u64, CacheKey>,

    /// Next tick to hand out.
    clock: u64,
}

impl LruReplacer {
    /// Create a new LRU replacer.
    pub fn new() -> Self {
        Self {
            last_access: HashMap::new(),
            by_recency: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Record that an entry was touched, making it most recently used.
    pub fn record_access(&mut self, key: CacheKey) {
        let tick = self.clock;
        self.clock += 1;

        if let Some(old) = self.last_access.insert(key, tick) {
            self.by_recency.remove(&old);
        }
        self.by_recency.insert(tick, key);
    }

    /// Select and forget the least recently used entry.
    pub fn evict(&mut self) -> Option<CacheKey> {
        let (_, key) = self.by_recency.pop_first()?;
        self.last_access.remove(&key);
        Some(key)
    }

    /// Forget an entry without evicting it.
    pub fn remove(&mut self, key: CacheKey) {
        if let Some(tick) = self.last_access.remove(&key) {
            self.by_recency.remove(&tick);
        }
    }

    /// Number of tracked entries.
    pub fn size(&self) -> usize {
        self.last_access.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
