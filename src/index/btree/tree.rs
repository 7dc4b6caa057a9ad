//! The B+Tree itself.

use tracing::{debug, info};

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::PageAllocator;

use super::inner::InnerNode;
use super::iterator::TreeScan;
use super::key::{Key, KeyType, RecordId};
use super::leaf::LeafNode;
use super::metadata::{TreeMetadata, METADATA_PAGE};
use super::node::{Node, PutOutcome, TreeContext};

/// A disk-resident B+Tree mapping fixed-width keys to record ids.
///
/// The tree owns its [`PageAllocator`]. Page 0 holds the metadata; every
/// other allocated page holds exactly one node.
///
/// ```text
///                  ┌──────────────┐
///                  │ inner (root) │
///                  └──┬───────┬───┘
///           ┌─────────┘       └─────────┐
///      ┌────▼────┐    next     ┌────────▼┐
///      │  leaf   │────────────▶│  leaf   │──▶ ...
///      └─────────┘             └─────────┘
/// ```
///
/// # Thread Safety
/// Operations take `&self` and rely on the allocator's locking for page
/// access, but a tree expects a single writer at a time.
///
/// # Example
/// ```no_run
/// use pagetree::{AllocatorConfig, BPlusTree, Key, KeyType, PageAllocator, PageCache, RecordId};
/// use std::sync::Arc;
///
/// let cache = Arc::new(PageCache::new(64));
/// let allocator = PageAllocator::create("index.db", cache, AllocatorConfig::default()).unwrap();
/// let mut tree = BPlusTree::create(allocator, KeyType::Int, 2).unwrap();
///
/// tree.put(Key::Int(42), RecordId::new(7, 1)).unwrap();
/// assert_eq!(tree.get(&Key::Int(42)).unwrap(), Some(RecordId::new(7, 1)));
/// ```
#[derive(Debug)]
pub struct BPlusTree {
    allocator: PageAllocator,
    metadata: TreeMetadata,
}

impl BPlusTree {
    /// Build an empty tree on a fresh allocator.
    ///
    /// Allocates the metadata page and an empty root leaf.
    ///
    /// # Errors
    /// - `Error::AllocatorInUse` if the allocator already holds pages
    /// - `Error::InvalidOrder` if `order` is 0 or a full node would not fit a page
    pub fn create(allocator: PageAllocator, key_type: KeyType, order: usize) -> Result<Self> {
        let pages = allocator.num_pages();
        if pages != 0 {
            return Err(Error::AllocatorInUse(pages));
        }
        let max = Self::max_order(PAGE_SIZE, key_type);
        if order == 0 || order > max {
            return Err(Error::InvalidOrder { order, max });
        }

        let meta_page = allocator.allocate()?;
        if meta_page != METADATA_PAGE {
            return Err(Error::CorruptMetadata(format!(
                "metadata landed on page {} instead of {}",
                meta_page, METADATA_PAGE
            )));
        }

        let ctx = TreeContext {
            allocator: &allocator,
            key_type,
            order,
        };
        let root = LeafNode::new(ctx, Vec::new(), Vec::new(), None)?.page();

        let metadata = TreeMetadata {
            key_type,
            order,
            root,
        };
        metadata.write_to(&allocator.fetch(METADATA_PAGE)?)?;

        info!(
            "Created B+Tree: key type {}, order {}, root {}",
            key_type, order, root
        );
        Ok(Self {
            allocator,
            metadata,
        })
    }

    /// Reopen a tree from its metadata page.
    ///
    /// # Errors
    /// `Error::CorruptMetadata` if page 0 is missing or does not hold tree
    /// metadata.
    pub fn open(allocator: PageAllocator) -> Result<Self> {
        if allocator.num_pages() == 0 {
            return Err(Error::CorruptMetadata("allocator holds no pages".to_string()));
        }
        let metadata = TreeMetadata::read_from(&allocator.fetch(METADATA_PAGE)?)?;

        info!(
            "Opened B+Tree: key type {}, order {}, root {}",
            metadata.key_type, metadata.order, metadata.root
        );
        Ok(Self {
            allocator,
            metadata,
        })
    }

    /// Largest order for which both node kinds fit in `page_size` bytes.
    pub fn max_order(page_size: usize, key_type: KeyType) -> usize {
        LeafNode::max_order(page_size, key_type).min(InnerNode::max_order(page_size, key_type))
    }

    fn ctx(&self) -> TreeContext<'_> {
        TreeContext {
            allocator: &self.allocator,
            key_type: self.metadata.key_type,
            order: self.metadata.order,
        }
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        let found = key.key_type();
        if found != self.metadata.key_type {
            return Err(Error::KeyTypeMismatch {
                expected: self.metadata.key_type.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn root(&self) -> Result<Node> {
        Node::load(self.ctx(), self.metadata.root)
    }

    // ========================================================================
    // Point operations
    // ========================================================================

    /// Record id stored under `key`, if any.
    pub fn get(&self, key: &Key) -> Result<Option<RecordId>> {
        self.check_key(key)?;
        let leaf = self.root()?.get(self.ctx(), key)?;
        Ok(leaf.get_rid(key))
    }

    /// Insert `key`, overwriting the record id if it is already present.
    ///
    /// A root split grows the tree by one level and rewrites the metadata.
    pub fn put(&mut self, key: Key, rid: RecordId) -> Result<()> {
        self.check_key(&key)?;
        let ctx = self.ctx();
        let mut root = self.root()?;

        if let PutOutcome::Split { key, right } = root.put(ctx, key, rid)? {
            let new_root = InnerNode::new(ctx, vec![key], vec![root.page(), right])?;
            debug!(
                "Root split: {} and {} under new root {}",
                root.page(),
                right,
                new_root.page()
            );
            self.set_root(new_root.page())?;
        }
        Ok(())
    }

    /// Delete `key`. Returns `false` if it was not present.
    ///
    /// Nodes are never merged; a leaf may be left empty.
    pub fn remove(&mut self, key: &Key) -> Result<bool> {
        self.check_key(key)?;
        let ctx = self.ctx();
        self.root()?.remove(ctx, key)
    }

    fn set_root(&mut self, root: PageId) -> Result<()> {
        self.metadata.root = root;
        self.metadata.write_to(&self.allocator.fetch(METADATA_PAGE)?)
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Every record id in ascending key order.
    pub fn scan_all(&self) -> Result<TreeScan<'_>> {
        let ctx = self.ctx();
        let leaf = self.root()?.leftmost_leaf(ctx)?;
        Ok(TreeScan::new(ctx, leaf, 0, None))
    }

    /// Record ids of keys `>= key`, ascending.
    pub fn scan_greater_equal(&self, key: &Key) -> Result<TreeScan<'_>> {
        self.check_key(key)?;
        let ctx = self.ctx();
        let leaf = self.root()?.get(ctx, key)?;
        let start = leaf.lower_bound(key);
        Ok(TreeScan::new(ctx, leaf, start, None))
    }

    /// Record ids of keys `< key`, ascending.
    pub fn scan_less_than(&self, key: &Key) -> Result<TreeScan<'_>> {
        self.check_key(key)?;
        let ctx = self.ctx();
        let leaf = self.root()?.leftmost_leaf(ctx)?;
        Ok(TreeScan::new(ctx, leaf, 0, Some(key.clone())))
    }

    // ========================================================================
    // Bulk load
    // ========================================================================

    /// Build the tree bottom-up from entries sorted by key.
    ///
    /// Leaves are packed to `floor(2d * fill_factor)` entries (at least one)
    /// and chained left to right; each inner level groups that many keys per
    /// node until a single root remains. The existing empty root page becomes
    /// the first leaf.
    ///
    /// # Errors
    /// Input is checked before anything is written:
    /// - `Error::BulkLoad` if `fill_factor` is not in `(0, 1]`, the keys are
    ///   not strictly increasing, or the tree is not empty
    /// - `Error::KeyTypeMismatch` if a key has the wrong type
    pub fn bulk_load<I>(&mut self, entries: I, fill_factor: f32) -> Result<()>
    where
        I: IntoIterator<Item = (Key, RecordId)>,
    {
        if !(fill_factor > 0.0 && fill_factor <= 1.0) {
            return Err(Error::BulkLoad(format!(
                "fill factor {} is outside (0, 1]",
                fill_factor
            )));
        }
        let entries: Vec<(Key, RecordId)> = entries.into_iter().collect();
        for (key, _) in &entries {
            self.check_key(key)?;
        }
        if let Some(i) = entries.windows(2).position(|w| w[0].0 >= w[1].0) {
            return Err(Error::BulkLoad(format!(
                "entries are not sorted: {} then {}",
                entries[i].0,
                entries[i + 1].0
            )));
        }
        match self.root()? {
            Node::Leaf(leaf) if leaf.keys().is_empty() => {}
            _ => return Err(Error::BulkLoad("tree is not empty".to_string())),
        }
        if entries.is_empty() {
            return Ok(());
        }

        let ctx = self.ctx();
        let d = self.metadata.order;
        let per_node = ((2 * d) as f32 * fill_factor).floor() as usize;
        let per_node = per_node.clamp(1, 2 * d);

        // Leaves: allocate every page up front so each can point at the next.
        let chunks: Vec<&[(Key, RecordId)]> = entries.chunks(per_node).collect();
        let mut pages = Vec::with_capacity(chunks.len());
        pages.push(self.metadata.root);
        for _ in 1..chunks.len() {
            pages.push(self.allocator.allocate()?);
        }

        let mut level: Vec<(Key, PageId)> = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let keys: Vec<Key> = chunk.iter().map(|(k, _)| k.clone()).collect();
            let rids: Vec<RecordId> = chunk.iter().map(|(_, r)| *r).collect();
            let leaf = LeafNode::at(ctx, pages[i], keys, rids, pages.get(i + 1).copied())?;
            level.push((chunk[0].0.clone(), leaf.page()));
        }

        let mut height = 1;
        while level.len() > 1 {
            let groups = group_children(level, per_node + 1, 2 * d + 1);
            level = Vec::with_capacity(groups.len());
            for group in groups {
                let min = group[0].0.clone();
                let keys: Vec<Key> = group[1..].iter().map(|(k, _)| k.clone()).collect();
                let children: Vec<PageId> = group.iter().map(|(_, p)| *p).collect();
                let inner = InnerNode::new(ctx, keys, children)?;
                level.push((min, inner.page()));
            }
            height += 1;
        }

        let root = level[0].1;
        self.set_root(root)?;
        info!(
            "Bulk loaded {} entries: {} leaves, height {}, root {}",
            entries.len(),
            chunks.len(),
            height,
            root
        );
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn key_type(&self) -> KeyType {
        self.metadata.key_type
    }

    pub fn order(&self) -> usize {
        self.metadata.order
    }

    pub fn root_page(&self) -> PageId {
        self.metadata.root
    }

    pub fn allocator(&self) -> &PageAllocator {
        &self.allocator
    }

    /// Number of levels, counting the leaves.
    pub fn height(&self) -> Result<usize> {
        let ctx = self.ctx();
        let mut height = 1;
        let mut node = self.root()?;
        while let Node::Inner(inner) = node {
            node = Node::load(ctx, inner.children()[0])?;
            height += 1;
        }
        Ok(height)
    }

    /// The tree as nested lists.
    ///
    /// A leaf is `((k (page slot)) ...)`; an inner node is
    /// `(child0 k0 child1 ... childN)`.
    pub fn to_sexp(&self) -> Result<String> {
        self.root()?.to_sexp(self.ctx())
    }

    /// The tree as a Graphviz digraph with one record-shaped node per page.
    pub fn to_dot(&self) -> Result<String> {
        let mut lines = vec![
            "digraph g {".to_string(),
            "  node [shape=record, height=0.1];".to_string(),
        ];
        self.root()?.to_dot(self.ctx(), &mut lines)?;
        lines.push("}".to_string());
        Ok(lines.join("\n"))
    }

    /// Flush every page and close the allocator.
    pub fn close(self) -> Result<()> {
        self.allocator.close()
    }
}

/// Split one level into groups of `size` children, folding a trailing
/// single child into its neighbour so every inner node gets a key.
fn group_children(level: Vec<(Key, PageId)>, size: usize, max: usize) -> Vec<Vec<(Key, PageId)>> {
    let mut groups: Vec<Vec<(Key, PageId)>> = Vec::new();
    let mut iter = level.into_iter().peekable();
    while iter.peek().is_some() {
        groups.push(iter.by_ref().take(size).collect());
    }

    if groups.len() > 1 && groups[groups.len() - 1].len() == 1 {
        let last = groups.len() - 1;
        if groups[last - 1].len() < max {
            let orphan = groups.remove(last);
            groups[last - 1].extend(orphan);
        } else if let Some(stolen) = groups[last - 1].pop() {
            groups[last].insert(0, stolen);
        }
    }
    groups
}
