//! Node dispatch and the shared context nodes run in.
//!
//! Nodes never hold references to each other. A parent stores child page
//! numbers and decodes a child from its page every time it descends, so the
//! page bytes are the only state that outlives a call.

use crate::common::{Error, PageId, Result};
use crate::storage::PageAllocator;

use super::inner::InnerNode;
use super::key::{Key, KeyType, RecordId};
use super::leaf::LeafNode;

/// Tag byte of an inner node page.
pub(crate) const INNER_TAG: u8 = 0;
/// Tag byte of a leaf node page.
pub(crate) const LEAF_TAG: u8 = 1;

/// Everything a node needs to load, allocate and sync pages.
#[derive(Clone, Copy)]
pub(crate) struct TreeContext<'a> {
    pub allocator: &'a PageAllocator,
    pub key_type: KeyType,
    pub order: usize,
}

/// What a `put` reports to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PutOutcome {
    /// The node absorbed the entry.
    Fit,
    /// The node split; `key` must be inserted in the parent with `right` as
    /// the child pointer to its right.
    Split { key: Key, right: PageId },
}

/// Either kind of node, decoded from a page.
#[derive(Debug)]
pub(crate) enum Node {
    Inner(InnerNode),
    Leaf(LeafNode),
}

impl Node {
    /// Decode the node stored on `page`.
    pub fn load(ctx: TreeContext<'_>, page: PageId) -> Result<Node> {
        let bytes = ctx.allocator.fetch(page)?.read_all();
        match bytes[0] {
            INNER_TAG => InnerNode::from_bytes(page, ctx.key_type, &bytes).map(Node::Inner),
            LEAF_TAG => LeafNode::from_bytes(page, ctx.key_type, &bytes).map(Node::Leaf),
            tag => Err(Error::CorruptNode {
                page: page.0,
                reason: format!("unknown node tag {}", tag),
            }),
        }
    }

    pub fn page(&self) -> PageId {
        match self {
            Node::Inner(n) => n.page(),
            Node::Leaf(n) => n.page(),
        }
    }

    /// The leaf `key` belongs in.
    pub fn get(self, ctx: TreeContext<'_>, key: &Key) -> Result<LeafNode> {
        match self {
            Node::Inner(n) => n.get(ctx, key),
            Node::Leaf(n) => Ok(n),
        }
    }

    pub fn leftmost_leaf(self, ctx: TreeContext<'_>) -> Result<LeafNode> {
        match self {
            Node::Inner(n) => n.leftmost_leaf(ctx),
            Node::Leaf(n) => Ok(n),
        }
    }

    pub fn put(&mut self, ctx: TreeContext<'_>, key: Key, rid: RecordId) -> Result<PutOutcome> {
        match self {
            Node::Inner(n) => n.put(ctx, key, rid),
            Node::Leaf(n) => n.put(ctx, key, rid),
        }
    }

    /// Remove `key` if present. Never merges or redistributes.
    pub fn remove(&mut self, ctx: TreeContext<'_>, key: &Key) -> Result<bool> {
        match self {
            Node::Inner(n) => n.remove(ctx, key),
            Node::Leaf(n) => n.remove(ctx, key),
        }
    }

    pub fn to_sexp(&self, ctx: TreeContext<'_>) -> Result<String> {
        match self {
            Node::Inner(n) => n.to_sexp(ctx),
            Node::Leaf(n) => Ok(n.to_sexp()),
        }
    }

    /// Append dot statements for this subtree to `lines`.
    pub fn to_dot(&self, ctx: TreeContext<'_>, lines: &mut Vec<String>) -> Result<()> {
        match self {
            Node::Inner(n) => n.to_dot(ctx, lines),
            Node::Leaf(n) => {
                lines.push(n.to_dot());
                Ok(())
            }
        }
    }
}

/// Number of keys in sorted `keys` that are `<= key`.
///
/// For an inner node this is the index of the child that owns `key`.
pub(crate) fn num_less_than_equal(key: &Key, keys: &[Key]) -> usize {
    keys.partition_point(|k| k <= key)
}

/// Number of keys in sorted `keys` that are `< key`.
pub(crate) fn num_less_than(key: &Key, keys: &[Key]) -> usize {
    keys.partition_point(|k| k < key)
}

/// Write `bytes` to a node page unless it already holds them.
pub(crate) fn sync_page(ctx: TreeContext<'_>, page: PageId, bytes: &[u8]) -> Result<()> {
    let handle = ctx.allocator.fetch(page)?;
    if handle.read(0, bytes.len()) != bytes {
        handle.write(0, bytes)?;
    }
    Ok(())
}

/// Read the 4-byte big-endian entry count after the tag byte.
pub(crate) fn read_count(page: PageId, bytes: &[u8], max: usize) -> Result<usize> {
    let n = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if n > max {
        return Err(Error::CorruptNode {
            page: page.0,
            reason: format!("{} entries exceeds the page capacity of {}", n, max),
        });
    }
    Ok(n)
}

pub(crate) fn corrupt_key(page: PageId, err: Error) -> Error {
    Error::CorruptNode {
        page: page.0,
        reason: err.to_string(),
    }
}
