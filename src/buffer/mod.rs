//! Page cache management.
//!
//! The page cache is the in-memory layer between the page allocators and
//! their backing files. One cache is shared by every open allocator.
//!
//! # Components
//! - [`PageCache`] - The shared, bounded LRU of page frames
//! - [`CacheKey`] - Allocator id + virtual page number packed into a `u64`
//! - [`CacheStats`] - Performance statistics
//! - [`replacer`] - Recency bookkeeping

mod page_cache;
pub mod replacer;
mod stats;

pub use page_cache::{CacheKey, PageCache};
pub use stats::{CacheStats, StatsSnapshot};
