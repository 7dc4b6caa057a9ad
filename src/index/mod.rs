//! Index structures.
//!
//! - [`btree`] - Disk-resident B+Tree over a [`PageAllocator`](crate::PageAllocator)

pub mod btree;

pub use btree::{BPlusTree, Key, KeyType, RecordId, TreeScan};
