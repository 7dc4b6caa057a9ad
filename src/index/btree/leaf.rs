//! Leaf nodes.

use tracing::debug;

use crate::common::{Error, PageId, Result};

use super::key::{Key, KeyType, RecordId};
use super::node::{
    corrupt_key, num_less_than, read_count, sync_page, PutOutcome, TreeContext, LEAF_TAG,
};

/// Fixed bytes of a leaf page: tag, count and next-leaf pointer.
const LEAF_OVERHEAD: usize = 1 + 4 + 4;

/// A leaf: sorted `(key, record id)` pairs plus a pointer to the next leaf.
///
/// # Layout (big-endian)
/// ```text
/// ┌─────┬───────┬────────────┬────────────────┬───────────┐
/// │ 1:1 │ n: u32│ n × key    │ n × record id  │ next: u32 │
/// └─────┴───────┴────────────┴────────────────┴───────────┘
/// ```
/// `next` is `u32::MAX` for the rightmost leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    page: PageId,
    keys: Vec<Key>,
    rids: Vec<RecordId>,
    right_sibling: Option<PageId>,
}

impl LeafNode {
    /// Allocate a page for a new leaf and write it.
    pub(crate) fn new(
        ctx: TreeContext<'_>,
        keys: Vec<Key>,
        rids: Vec<RecordId>,
        right_sibling: Option<PageId>,
    ) -> Result<Self> {
        let page = ctx.allocator.allocate()?;
        Self::at(ctx, page, keys, rids, right_sibling)
    }

    /// Build a leaf on an already allocated page and write it.
    pub(crate) fn at(
        ctx: TreeContext<'_>,
        page: PageId,
        keys: Vec<Key>,
        rids: Vec<RecordId>,
        right_sibling: Option<PageId>,
    ) -> Result<Self> {
        debug_assert_eq!(keys.len(), rids.len());
        let leaf = Self {
            page,
            keys,
            rids,
            right_sibling,
        };
        leaf.sync(ctx)?;
        Ok(leaf)
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn rids(&self) -> &[RecordId] {
        &self.rids
    }

    pub fn right_sibling(&self) -> Option<PageId> {
        self.right_sibling
    }

    /// Record id stored under exactly `key`.
    pub fn get_rid(&self, key: &Key) -> Option<RecordId> {
        self.keys.binary_search(key).ok().map(|i| self.rids[i])
    }

    /// Index of the first entry `>= key`.
    pub fn lower_bound(&self, key: &Key) -> usize {
        num_less_than(key, &self.keys)
    }

    /// Insert or overwrite an entry, splitting if the leaf overflows.
    ///
    /// On a split this leaf keeps the first `d` entries, the new right
    /// sibling takes the remaining `d + 1` and its first key is copied up.
    pub(crate) fn put(&mut self, ctx: TreeContext<'_>, key: Key, rid: RecordId) -> Result<PutOutcome> {
        match self.keys.binary_search(&key) {
            Ok(i) => self.rids[i] = rid,
            Err(i) => {
                self.keys.insert(i, key);
                self.rids.insert(i, rid);
            }
        }

        if self.keys.len() <= 2 * ctx.order {
            self.sync(ctx)?;
            return Ok(PutOutcome::Fit);
        }

        let d = ctx.order;
        let right_keys = self.keys.split_off(d);
        let right_rids = self.rids.split_off(d);
        let split_key = right_keys[0].clone();

        let right = LeafNode::new(ctx, right_keys, right_rids, self.right_sibling)?;
        self.right_sibling = Some(right.page);
        self.sync(ctx)?;

        debug!("leaf {} split, new sibling {}", self.page, right.page);
        Ok(PutOutcome::Split {
            key: split_key,
            right: right.page,
        })
    }

    /// Delete the entry for `key`. The leaf may be left empty.
    pub(crate) fn remove(&mut self, ctx: TreeContext<'_>, key: &Key) -> Result<bool> {
        match self.keys.binary_search(key) {
            Ok(i) => {
                self.keys.remove(i);
                self.rids.remove(i);
                self.sync(ctx)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    pub(crate) fn sync(&self, ctx: TreeContext<'_>) -> Result<()> {
        sync_page(ctx, self.page, &self.to_bytes())
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Largest order `d` whose full leaf (`2d` entries) fits in `page_size` bytes.
    pub fn max_order(page_size: usize, key_type: KeyType) -> usize {
        let entries = page_size.saturating_sub(LEAF_OVERHEAD) / (key_type.width() + RecordId::SIZE);
        entries / 2
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.keys.first().map_or(0, |k| k.key_type().width());
        let mut buf = Vec::with_capacity(LEAF_OVERHEAD + self.keys.len() * (width + RecordId::SIZE));

        buf.push(LEAF_TAG);
        buf.extend_from_slice(&(self.keys.len() as u32).to_be_bytes());
        for key in &self.keys {
            key.encode_into(&mut buf);
        }
        for rid in &self.rids {
            rid.encode_into(&mut buf);
        }
        buf.extend_from_slice(&self.right_sibling.unwrap_or(PageId::INVALID).to_be_bytes());
        buf
    }

    /// Decode a leaf from the bytes of `page`.
    ///
    /// # Errors
    /// `Error::CorruptNode` if the tag is not the leaf tag, the count does
    /// not fit the page, or a key fails to decode.
    pub fn from_bytes(page: PageId, key_type: KeyType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LEAF_OVERHEAD || bytes[0] != LEAF_TAG {
            return Err(Error::CorruptNode {
                page: page.0,
                reason: format!("expected leaf tag {}", LEAF_TAG),
            });
        }

        let width = key_type.width();
        let max = bytes.len().saturating_sub(LEAF_OVERHEAD) / (width + RecordId::SIZE);
        let n = read_count(page, bytes, max)?;

        let mut offset = 5;
        let mut keys = Vec::with_capacity(n);
        for _ in 0..n {
            keys.push(Key::decode(&bytes[offset..], key_type).map_err(|e| corrupt_key(page, e))?);
            offset += width;
        }
        let mut rids = Vec::with_capacity(n);
        for _ in 0..n {
            rids.push(RecordId::decode(&bytes[offset..]));
            offset += RecordId::SIZE;
        }
        let next = PageId::from_be_slice(&bytes[offset..]);

        Ok(Self {
            page,
            keys,
            rids,
            right_sibling: next.is_valid().then_some(next),
        })
    }

    // ========================================================================
    // Debug output
    // ========================================================================

    pub(crate) fn to_sexp(&self) -> String {
        let entries: Vec<String> = self
            .keys
            .iter()
            .zip(&self.rids)
            .map(|(key, rid)| format!("({} {})", key, rid.to_sexp()))
            .collect();
        format!("({})", entries.join(" "))
    }

    pub(crate) fn to_dot(&self) -> String {
        let entries: Vec<String> = self
            .keys
            .iter()
            .zip(&self.rids)
            .map(|(key, rid)| format!("{}: {}", key, rid.to_sexp()))
            .collect();
        format!("  node{}[label = \"{{{}}}\"];", self.page.0, entries.join("|"))
    }
}
