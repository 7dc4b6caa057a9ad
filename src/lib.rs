//! pagetree - a disk-resident B+Tree index over a bitmap page allocator.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            pagetree                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Index Layer (index/)                      │   │
//! │  │     BPlusTree + inner/leaf nodes + TreeScan + codec      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Allocation Layer (storage/)                 │   │
//! │  │    PageAllocator: master page → header bitmaps → data    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Page Cache (buffer/)                       │   │
//! │  │   One LRU shared by every allocator, keyed by            │   │
//! │  │   (allocator id, page number) packed into a u64          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Disk (storage/disk_manager)                │   │
//! │  │            Fixed-size block reads and writes             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, config)
//! - [`buffer`] - The shared LRU page cache
//! - [`storage`] - Disk I/O, pages and the page allocator
//! - [`iter`] - Backtracking iterators
//! - [`index`] - The B+Tree
//!
//! # Quick Start
//! ```no_run
//! use pagetree::{AllocatorConfig, BPlusTree, Key, KeyType, PageAllocator, PageCache, RecordId};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(PageCache::new(256));
//! let allocator = PageAllocator::create("orders_idx.db", cache, AllocatorConfig::default()).unwrap();
//! let mut tree = BPlusTree::create(allocator, KeyType::Int, 64).unwrap();
//!
//! tree.put(Key::Int(17), RecordId::new(3, 9)).unwrap();
//! for rid in tree.scan_all().unwrap() {
//!     println!("{}", rid.unwrap());
//! }
//! tree.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod iter;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{AllocatorConfig, Error, PageId, Result};

pub use buffer::{CacheKey, CacheStats, PageCache, StatsSnapshot};
pub use index::{BPlusTree, Key, KeyType, RecordId, TreeScan};
pub use storage::{DiskManager, Page, PageAllocator, PageIter};
