//! Inner nodes.

use tracing::debug;

use crate::common::{Error, PageId, Result};

use super::key::{Key, KeyType, RecordId};
use super::leaf::LeafNode;
use super::node::{
    corrupt_key, num_less_than_equal, read_count, sync_page, Node, PutOutcome, TreeContext,
    INNER_TAG,
};

/// Fixed bytes of an inner page: tag, count and the extra child pointer.
const INNER_OVERHEAD: usize = 1 + 4 + 4;
const CHILD_SIZE: usize = 4;

/// An inner node: `n` sorted keys and `n + 1` child page numbers.
///
/// Child `i` holds every key `k` with `keys[i - 1] <= k < keys[i]`.
///
/// # Layout (big-endian)
/// ```text
/// ┌─────┬───────┬────────────┬──────────────────┐
/// │ 1:0 │ n: u32│ n × key    │ (n + 1) × u32    │
/// └─────┴───────┴────────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerNode {
    page: PageId,
    keys: Vec<Key>,
    children: Vec<PageId>,
}

impl InnerNode {
    /// Allocate a page for a new inner node and write it.
    pub(crate) fn new(ctx: TreeContext<'_>, keys: Vec<Key>, children: Vec<PageId>) -> Result<Self> {
        debug_assert_eq!(keys.len() + 1, children.len());
        let node = Self {
            page: ctx.allocator.allocate()?,
            keys,
            children,
        };
        node.sync(ctx)?;
        Ok(node)
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    #[cfg(test)]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn children(&self) -> &[PageId] {
        &self.children
    }

    fn child_for(&self, key: &Key) -> PageId {
        self.children[num_less_than_equal(key, &self.keys)]
    }

    /// Descend to the leaf `key` belongs in.
    pub(crate) fn get(self, ctx: TreeContext<'_>, key: &Key) -> Result<LeafNode> {
        Node::load(ctx, self.child_for(key))?.get(ctx, key)
    }

    pub(crate) fn leftmost_leaf(self, ctx: TreeContext<'_>) -> Result<LeafNode> {
        Node::load(ctx, self.children[0])?.leftmost_leaf(ctx)
    }

    /// Insert into the owning child and absorb its split, splitting this
    /// node in turn if it overflows.
    ///
    /// On a split both halves keep `d` keys; the middle key moves up.
    pub(crate) fn put(&mut self, ctx: TreeContext<'_>, key: Key, rid: RecordId) -> Result<PutOutcome> {
        let index = num_less_than_equal(&key, &self.keys);
        let mut child = Node::load(ctx, self.children[index])?;

        let (split_key, right_child) = match child.put(ctx, key, rid)? {
            PutOutcome::Fit => return Ok(PutOutcome::Fit),
            PutOutcome::Split { key, right } => (key, right),
        };
        self.keys.insert(index, split_key);
        self.children.insert(index + 1, right_child);

        if self.keys.len() <= 2 * ctx.order {
            self.sync(ctx)?;
            return Ok(PutOutcome::Fit);
        }

        let d = ctx.order;
        let right_keys = self.keys.split_off(d + 1);
        let right_children = self.children.split_off(d + 1);
        let Some(middle) = self.keys.pop() else {
            return Err(Error::CorruptNode {
                page: self.page.0,
                reason: "split of an inner node with no keys".to_string(),
            });
        };

        let right = InnerNode::new(ctx, right_keys, right_children)?;
        self.sync(ctx)?;

        debug!("inner {} split, new sibling {}", self.page, right.page);
        Ok(PutOutcome::Split {
            key: middle,
            right: right.page,
        })
    }

    pub(crate) fn remove(&mut self, ctx: TreeContext<'_>, key: &Key) -> Result<bool> {
        Node::load(ctx, self.child_for(key))?.remove(ctx, key)
    }

    pub(crate) fn sync(&self, ctx: TreeContext<'_>) -> Result<()> {
        sync_page(ctx, self.page, &self.to_bytes())
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Largest order `d` whose full inner node (`2d` keys, `2d + 1` children)
    /// fits in `page_size` bytes.
    pub fn max_order(page_size: usize, key_type: KeyType) -> usize {
        let keys = page_size.saturating_sub(INNER_OVERHEAD) / (key_type.width() + CHILD_SIZE);
        keys / 2
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.keys.first().map_or(0, |k| k.key_type().width());
        let mut buf = Vec::with_capacity(INNER_OVERHEAD + self.keys.len() * (width + CHILD_SIZE));

        buf.push(INNER_TAG);
        buf.extend_from_slice(&(self.keys.len() as u32).to_be_bytes());
        for key in &self.keys {
            key.encode_into(&mut buf);
        }
        for child in &self.children {
            buf.extend_from_slice(&child.to_be_bytes());
        }
        buf
    }

    /// Decode an inner node from the bytes of `page`.
    ///
    /// # Errors
    /// `Error::CorruptNode` if the tag is not the inner tag, the count does
    /// not fit the page, or a key fails to decode.
    pub fn from_bytes(page: PageId, key_type: KeyType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INNER_OVERHEAD || bytes[0] != INNER_TAG {
            return Err(Error::CorruptNode {
                page: page.0,
                reason: format!("expected inner tag {}", INNER_TAG),
            });
        }

        let width = key_type.width();
        let max = bytes.len().saturating_sub(INNER_OVERHEAD) / (width + CHILD_SIZE);
        let n = read_count(page, bytes, max)?;

        let mut offset = 5;
        let mut keys = Vec::with_capacity(n);
        for _ in 0..n {
            keys.push(Key::decode(&bytes[offset..], key_type).map_err(|e| corrupt_key(page, e))?);
            offset += width;
        }
        let mut children = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            children.push(PageId::from_be_slice(&bytes[offset..]));
            offset += CHILD_SIZE;
        }

        Ok(Self {
            page,
            keys,
            children,
        })
    }

    // ========================================================================
    // Debug output
    // ========================================================================

    pub(crate) fn to_sexp(&self, ctx: TreeContext<'_>) -> Result<String> {
        let mut parts = Vec::with_capacity(self.keys.len() * 2 + 1);
        parts.push(Node::load(ctx, self.children[0])?.to_sexp(ctx)?);
        for (key, child) in self.keys.iter().zip(&self.children[1..]) {
            parts.push(key.to_string());
            parts.push(Node::load(ctx, *child)?.to_sexp(ctx)?);
        }
        Ok(format!("({})", parts.join(" ")))
    }

    pub(crate) fn to_dot(&self, ctx: TreeContext<'_>, lines: &mut Vec<String>) -> Result<()> {
        let mut fields = vec!["<f0>".to_string()];
        for (i, key) in self.keys.iter().enumerate() {
            fields.push(key.to_string());
            fields.push(format!("<f{}>", i + 1));
        }
        lines.push(format!("  node{}[label = \"{}\"];", self.page.0, fields.join("|")));

        for (i, child) in self.children.iter().enumerate() {
            Node::load(ctx, *child)?.to_dot(ctx, lines)?;
            lines.push(format!("  \"node{}\":f{} -> \"node{}\";", self.page.0, i, child.0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PageCache;
    use crate::common::config::PAGE_SIZE;
    use crate::common::AllocatorConfig;
    use crate::storage::PageAllocator;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_allocator() -> (PageAllocator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let allocator = PageAllocator::create(
            dir.path().join("inner.db"),
            Arc::new(PageCache::new(32)),
            AllocatorConfig::default().with_durable(false),
        )
        .unwrap();
        (allocator, dir)
    }

    fn ints(values: &[i32]) -> Vec<Key> {
        values.iter().copied().map(Key::Int).collect()
    }

    #[test]
    fn test_max_order() {
        assert_eq!(InnerNode::max_order(100, KeyType::Int), 5);
        assert_eq!(InnerNode::max_order(PAGE_SIZE, KeyType::Int), 255);
        assert_eq!(InnerNode::max_order(8, KeyType::Int), 0);
    }

    #[test]
    fn test_byte_layout() {
        let node = InnerNode {
            page: PageId::new(2),
            keys: ints(&[7]),
            children: vec![PageId::new(3), PageId::new(4)],
        };
        let bytes = node.to_bytes();

        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 1]);
        assert_eq!(&bytes[5..9], &[0, 0, 0, 7]);
        assert_eq!(&bytes[9..17], &[0, 0, 0, 3, 0, 0, 0, 4]);
        assert_eq!(InnerNode::from_bytes(PageId::new(2), KeyType::Int, &bytes).unwrap(), node);
    }

    #[test]
    fn test_decode_rejects_oversized_count() {
        let mut bytes = vec![0u8; 64];
        bytes[1..5].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(
            InnerNode::from_bytes(PageId::new(5), KeyType::Int, &bytes),
            Err(Error::CorruptNode { page: 5, .. })
        ));
    }

    #[test]
    fn test_routes_to_child_and_absorbs_split() {
        let (allocator, _dir) = test_allocator();
        let ctx = TreeContext {
            allocator: &allocator,
            key_type: KeyType::Int,
            order: 1,
        };

        let rid = |i: i32| RecordId::new(i as u32, 0);
        let left = LeafNode::new(ctx, ints(&[1]), vec![rid(1)], None).unwrap();
        let right = LeafNode::new(ctx, ints(&[5, 6]), vec![rid(5), rid(6)], None).unwrap();
        let mut inner = InnerNode::new(ctx, ints(&[5]), vec![left.page(), right.page()]).unwrap();

        assert_eq!(inner.clone().get(ctx, &Key::Int(0)).unwrap().page(), left.page());
        assert_eq!(inner.clone().get(ctx, &Key::Int(5)).unwrap().page(), right.page());

        // Right leaf overflows at three entries with d = 1.
        assert_eq!(inner.put(ctx, Key::Int(7), rid(7)).unwrap(), PutOutcome::Fit);
        assert_eq!(inner.keys(), &ints(&[5, 6])[..]);
        assert_eq!(inner.children().len(), 3);
        assert_eq!(inner.to_sexp(ctx).unwrap(), "(((1 (1 0))) 5 ((5 (5 0))) 6 ((6 (6 0)) (7 (7 0))))");

        // A third split pushes the inner node over 2d keys.
        let outcome = inner.put(ctx, Key::Int(8), rid(8)).unwrap();
        let PutOutcome::Split { key, right } = outcome else {
            panic!("expected split");
        };
        assert_eq!(key, Key::Int(6));
        assert_eq!(inner.keys(), &ints(&[5])[..]);

        let bytes = allocator.fetch(right).unwrap().read_all();
        let sibling = InnerNode::from_bytes(right, KeyType::Int, &bytes).unwrap();
        assert_eq!(sibling.keys(), &ints(&[7])[..]);
        assert_eq!(sibling.children().len(), 2);
    }

    #[test]
    fn test_dot_lists_fields_and_edges() {
        let (allocator, _dir) = test_allocator();
        let ctx = TreeContext {
            allocator: &allocator,
            key_type: KeyType::Int,
            order: 2,
        };
        let a = LeafNode::new(ctx, ints(&[1]), vec![RecordId::new(1, 1)], None).unwrap();
        let b = LeafNode::new(ctx, ints(&[2]), vec![RecordId::new(2, 2)], None).unwrap();
        let inner = InnerNode::new(ctx, ints(&[2]), vec![a.page(), b.page()]).unwrap();

        let mut lines = Vec::new();
        inner.to_dot(ctx, &mut lines).unwrap();

        let p = inner.page().0;
        assert_eq!(lines[0], format!("  node{}[label = \"<f0>|2|<f1>\"];", p));
        assert!(lines.contains(&format!("  \"node{}\":f0 -> \"node{}\";", p, a.page().0)));
        assert!(lines.contains(&format!("  \"node{}\":f1 -> \"node{}\";", p, b.page().0)));
    }
}
