//! Page-backed B+Tree index.
//!
//! # Components
//! - [`BPlusTree`] - Point lookups, inserts, removes, scans and bulk load
//! - [`TreeScan`] - Lazy range scan over the leaf chain
//! - [`Key`] / [`KeyType`] - Fixed-width key codec
//! - [`RecordId`] - The value stored per key
//!
//! Node types stay private to this module: callers only see the tree.

mod inner;
mod iterator;
mod key;
mod leaf;
mod metadata;
mod node;
mod tree;

pub use iterator::TreeScan;
pub use key::{Key, KeyType, RecordId, STRING_ALPHABET};
pub use tree::BPlusTree;
