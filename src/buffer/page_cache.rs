//! Page Cache - the process-wide, bounded LRU of page frames.
//!
//! The [`PageCache`] provides:
//! - One cache shared by every open [`PageAllocator`](crate::storage::PageAllocator)
//! - Least-recently-used eviction once capacity is exceeded
//! - Write-back of dirty frames on eviction

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::CacheStats;
use crate::common::PageId;
use crate::storage::page::Frame;

/// Process-global identity of a cached page.
///
/// Packs the owning allocator's id into the high 32 bits and the virtual page
/// number into the low 32 bits, so pages from different allocators never
/// collide in the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(pub u64);

impl CacheKey {
    /// Build the key for `page` of allocator `allocator_id`.
    #[inline]
    pub fn new(allocator_id: u32, page: PageId) -> Self {
        CacheKey(((allocator_id as u64) << 32) | page.0 as u64)
    }

    /// The allocator half of the key.
    #[inline]
    pub fn allocator_id(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The page half of the key.
    #[inline]
    pub fn page(&self) -> PageId {
        PageId::new(self.0 as u32)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.allocator_id(), self.page().0)
    }
}

/// Everything guarded by the cache lock.
struct CacheState {
    frames: HashMap<CacheKey, Arc<Frame>>,
    replacer: LruReplacer,
}

/// A bounded map from [`CacheKey`] to cached page frames.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────┐
/// │                      PageCache                      │
/// │  ┌───────────────────────┐  ┌───────────────────┐   │
/// │  │ frames                │  │ replacer          │   │
/// │  │ CacheKey → Arc<Frame> │  │ LruReplacer       │   │
/// │  └───────────────────────┘  └───────────────────┘   │
/// │            one Mutex guards both                    │
/// └─────────────────────────────────────────────────────┘
///        ▲                ▲                 ▲
///   allocator 0      allocator 1   ...  allocator N
/// ```
///
/// # Thread Safety
/// A single `Mutex` covers the map and the recency order, so one allocator
/// evicting a page can never race with another allocator's fetch. Dirty
/// victims are written back while the lock is held. Lock order is cache,
/// then frame data, then the victim's disk.
///
/// Share it between allocators with `Arc<PageCache>`.
pub struct PageCache {
    state: Mutex<CacheState>,
    stats: CacheStats,
    capacity: usize,
    next_allocator_id: AtomicU32,
}

impl PageCache {
    /// Create a cache holding at most `capacity` pages.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be > 0");

        Self {
            state: Mutex::new(CacheState {
                frames: HashMap::new(),
                replacer: LruReplacer::new(),
            }),
            stats: CacheStats::new(),
            capacity,
            next_allocator_id: AtomicU32::new(0),
        }
    }

    /// Hand out a fresh allocator id for [`CacheKey`]s.
    pub(crate) fn register_allocator(&self) -> u32 {
        self.next_allocator_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a frame, marking it most recently used.
    pub(crate) fn get(&self, key: CacheKey) -> Option<Arc<Frame>> {
        let mut state = self.state.lock();
        let frame = state.frames.get(&key).cloned();

        match frame {
            Some(frame) => {
                state.replacer.record_access(key);
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            None => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a frame as most recently used, evicting if over capacity.
    ///
    /// A dirty victim that cannot be written back stays cached and eviction
    /// moves on to the next victim, so the cache only runs over capacity by
    /// the number of such frames. The failure belongs to the victim's owner,
    /// which sees it on its next flush or close; the caller inserting `key`
    /// never does.
    pub(crate) fn put(&self, key: CacheKey, frame: Arc<Frame>) {
        let mut state = self.state.lock();
        state.frames.insert(key, frame);
        state.replacer.record_access(key);

        let mut kept = Vec::new();
        while state.frames.len() > self.capacity {
            let Some(victim) = state.replacer.evict() else {
                break;
            };
            let Some(frame) = state.frames.remove(&victim) else {
                continue;
            };
            trace!("evicting page {} from cache", victim);
            match frame.flush() {
                Ok(written) => {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    if written {
                        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    warn!("keeping page {} cached, write-back failed: {}", victim, e);
                    kept.push((victim, frame));
                }
            }
        }

        for (victim, frame) in kept {
            state.frames.insert(victim, frame);
            state.replacer.record_access(victim);
        }
    }

    /// Drop a frame without writing it back.
    pub(crate) fn remove(&self, key: CacheKey) -> Option<Arc<Frame>> {
        let mut state = self.state.lock();
        state.replacer.remove(key);
        state.frames.remove(&key)
    }

    /// Every cached frame owned by one allocator, in page order.
    pub(crate) fn frames_of(&self, allocator_id: u32) -> Vec<Arc<Frame>> {
        let state = self.state.lock();
        let mut owned: Vec<(CacheKey, Arc<Frame>)> = state
            .frames
            .iter()
            .filter(|(key, _)| key.allocator_id() == allocator_id)
            .map(|(key, frame)| (*key, Arc::clone(frame)))
            .collect();
        owned.sort_by_key(|(key, _)| *key);
        owned.into_iter().map(|(_, frame)| frame).collect()
    }

    /// Drop every frame owned by one allocator, returning them for flushing.
    pub(crate) fn remove_allocator(&self, allocator_id: u32) -> Vec<Arc<Frame>> {
        let mut state = self.state.lock();
        let keys: Vec<CacheKey> = state
            .frames
            .keys()
            .filter(|key| key.allocator_id() == allocator_id)
            .copied()
            .collect();

        keys.into_iter()
            .filter_map(|key| {
                state.replacer.remove(key);
                state.frames.remove(&key)
            })
            .collect()
    }

    /// Whether a page is currently cached. Does not count as a touch.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.state.lock().frames.contains_key(&key)
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Whether the cache holds no pages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(crate::common::config::DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PAGE_SIZE;
    use crate::storage::DiskManager;
    use tempfile::tempdir;

    fn test_disk() -> (Arc<parking_lot::Mutex<DiskManager>>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("cache.db")).unwrap();
        (Arc::new(parking_lot::Mutex::new(dm)), dir)
    }

    fn frame(disk: &Arc<parking_lot::Mutex<DiskManager>>, page: u32) -> Arc<Frame> {
        Arc::new(Frame::load(PageId::new(page), page as u64, false, Arc::clone(disk)).unwrap())
    }

    #[test]
    fn test_cache_key_packing() {
        let key = CacheKey::new(3, PageId::new(17));
        assert_eq!(key.0, (3u64 << 32) | 17);
        assert_eq!(key.allocator_id(), 3);
        assert_eq!(key.page(), PageId::new(17));
        assert_ne!(key, CacheKey::new(4, PageId::new(17)));
    }

    #[test]
    fn test_get_counts_hits_and_misses() {
        let (disk, _dir) = test_disk();
        let cache = PageCache::new(4);
        let key = CacheKey::new(0, PageId::new(1));

        assert!(cache.get(key).is_none());
        cache.put(key, frame(&disk, 1));
        assert!(cache.get(key).is_some());

        let snapshot = cache.stats().snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (disk, _dir) = test_disk();
        let cache = PageCache::new(2);
        let k0 = CacheKey::new(0, PageId::new(0));
        let k1 = CacheKey::new(0, PageId::new(1));
        let k2 = CacheKey::new(0, PageId::new(2));

        cache.put(k0, frame(&disk, 0));
        cache.put(k1, frame(&disk, 1));
        cache.get(k0); // k1 is now least recently used
        cache.put(k2, frame(&disk, 2));

        assert!(cache.contains(k0));
        assert!(!cache.contains(k1));
        assert!(cache.contains(k2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().snapshot().evictions, 1);
    }

    #[test]
    fn test_eviction_writes_back_dirty_frame() {
        let (disk, _dir) = test_disk();
        let cache = PageCache::new(1);

        let dirty = frame(&disk, 5);
        dirty.update(|data| data[0] = 0x42);
        cache.put(CacheKey::new(0, PageId::new(5)), dirty);
        cache.put(CacheKey::new(0, PageId::new(6)), frame(&disk, 6));

        let mut buf = [0u8; PAGE_SIZE];
        disk.lock().read_block(5, &mut buf).unwrap();
        assert_eq!(buf[0], 0x42);
        assert_eq!(cache.stats().snapshot().pages_written, 1);
    }

    #[test]
    fn test_failed_write_back_keeps_victim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("readonly.db");
        DiskManager::create(&path).unwrap();
        let file = std::fs::OpenOptions::new().read(true).open(&path).unwrap();
        let broken = Arc::new(parking_lot::Mutex::new(DiskManager::from_file(file)));
        let (disk, _dir) = test_disk();
        let cache = PageCache::new(1);

        let victim = CacheKey::new(9, PageId::new(0));
        let stuck = Arc::new(Frame::load(PageId::new(0), 1, false, broken).unwrap());
        stuck.update(|data| data[0] = 1);
        cache.put(victim, stuck);

        let key = CacheKey::new(0, PageId::new(0));
        cache.put(key, frame(&disk, 0));

        assert!(cache.contains(victim));
        assert!(cache.contains(key));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(victim).unwrap().is_dirty());
        assert_eq!(cache.stats().snapshot().evictions, 0);

        // The next insert evicts the clean page instead
        let other = CacheKey::new(0, PageId::new(1));
        cache.put(other, frame(&disk, 1));
        assert!(!cache.contains(key));
        assert!(cache.contains(victim));
    }

    #[test]
    fn test_remove_allocator_only_touches_owner() {
        let (disk, _dir) = test_disk();
        let cache = PageCache::new(8);

        cache.put(CacheKey::new(1, PageId::new(0)), frame(&disk, 0));
        cache.put(CacheKey::new(1, PageId::new(1)), frame(&disk, 1));
        cache.put(CacheKey::new(2, PageId::new(0)), frame(&disk, 2));

        assert_eq!(cache.frames_of(1).len(), 2);
        assert_eq!(cache.remove_allocator(1).len(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(CacheKey::new(2, PageId::new(0))));
    }
}
