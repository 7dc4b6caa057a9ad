//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`LruReplacer`] - Least recently used, as the page cache requires

mod lru;

pub use lru::LruReplacer;
