//! Range scans over the leaf chain.

use crate::common::{PageId, Result};
use crate::iter::BacktrackingIterator;

use super::key::{Key, RecordId};
use super::leaf::LeafNode;
use super::node::TreeContext;

/// A lazy ascending scan of record ids.
///
/// The scan holds a copy of one leaf at a time and follows next-leaf
/// pointers as it runs out, so memory stays bounded by a single node.
/// Empty leaves left behind by removals are skipped.
///
/// A page read failure is yielded once as `Some(Err(_))`, after which the
/// scan ends.
///
/// # Example
/// ```no_run
/// use pagetree::{BPlusTree, Key, KeyType, PageAllocator, PageCache, AllocatorConfig};
/// use std::sync::Arc;
///
/// let cache = Arc::new(PageCache::new(64));
/// let allocator = PageAllocator::create("index.db", cache, AllocatorConfig::default()).unwrap();
/// let tree = BPlusTree::create(allocator, KeyType::Int, 2).unwrap();
///
/// for rid in tree.scan_greater_equal(&Key::Int(10)).unwrap() {
///     println!("{}", rid.unwrap());
/// }
/// ```
pub struct TreeScan<'a> {
    ctx: TreeContext<'a>,
    leaf: PageId,
    keys: Vec<Key>,
    rids: Vec<RecordId>,
    next_leaf: Option<PageId>,
    /// Next entry of the current leaf to return.
    index: usize,
    /// Exclusive upper bound.
    upper: Option<Key>,
    /// Position of the last value returned since construction or reset.
    prev: Option<(PageId, usize)>,
    marked: Option<(PageId, usize)>,
    pending: Option<crate::common::Error>,
    done: bool,
}

impl<'a> TreeScan<'a> {
    /// Start at entry `index` of `leaf`, stopping before the first key
    /// `>= upper` if a bound is given.
    pub(crate) fn new(ctx: TreeContext<'a>, leaf: LeafNode, index: usize, upper: Option<Key>) -> Self {
        let mut scan = Self {
            ctx,
            leaf: leaf.page(),
            keys: Vec::new(),
            rids: Vec::new(),
            next_leaf: None,
            index,
            upper,
            prev: None,
            marked: None,
            pending: None,
            done: false,
        };
        scan.enter(leaf, index);
        scan
    }

    fn enter(&mut self, leaf: LeafNode, index: usize) {
        self.leaf = leaf.page();
        self.keys = leaf.keys().to_vec();
        self.rids = leaf.rids().to_vec();
        self.next_leaf = leaf.right_sibling();
        self.index = index;
    }

    fn load(&self, page: PageId) -> Result<LeafNode> {
        let bytes = self.ctx.allocator.fetch(page)?.read_all();
        LeafNode::from_bytes(page, self.ctx.key_type, &bytes)
    }

    /// Move forward until the cursor sits on a returnable entry.
    fn settle(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        while !self.done {
            if let Some(key) = self.keys.get(self.index) {
                if self.upper.as_ref().is_some_and(|upper| key >= upper) {
                    self.done = true;
                    return false;
                }
                return true;
            }
            let Some(next) = self.next_leaf else {
                self.done = true;
                return false;
            };
            match self.load(next) {
                Ok(leaf) => self.enter(leaf, 0),
                Err(e) => {
                    self.pending = Some(e);
                    return true;
                }
            }
        }
        false
    }
}

impl Iterator for TreeScan<'_> {
    type Item = Result<RecordId>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.settle() {
            return None;
        }
        if let Some(e) = self.pending.take() {
            self.done = true;
            return Some(Err(e));
        }

        let rid = self.rids[self.index];
        self.prev = Some((self.leaf, self.index));
        self.index += 1;
        Some(Ok(rid))
    }
}

impl BacktrackingIterator for TreeScan<'_> {
    fn has_next(&mut self) -> bool {
        self.settle()
    }

    fn mark(&mut self) {
        if let Some(prev) = self.prev {
            self.marked = Some(prev);
        }
    }

    fn reset(&mut self) {
        let Some((page, index)) = self.marked else {
            return;
        };
        self.prev = None;
        self.done = false;
        self.pending = None;

        if page == self.leaf {
            self.index = index;
            return;
        }
        match self.load(page) {
            Ok(leaf) => self.enter(leaf, index),
            Err(e) => self.pending = Some(e),
        }
    }
}

impl std::fmt::Debug for TreeScan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeScan")
            .field("leaf", &self.leaf)
            .field("index", &self.index)
            .field("upper", &self.upper)
            .field("marked", &self.marked)
            .field("done", &self.done)
            .finish()
    }
}
