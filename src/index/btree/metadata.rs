//! Tree metadata page.

use crate::common::{Error, PageId, Result};
use crate::storage::Page;

use super::key::KeyType;

/// Page holding the metadata of a tree: always the first page allocated.
pub const METADATA_PAGE: PageId = PageId(0);

/// Key type, order and root of a tree.
///
/// # Layout (21 bytes, big-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     magic ("BPTM")
/// 4       1     key type tag
/// 5       4     key width
/// 9       4     order d
/// 13      4     root page number
/// 17      4     CRC32 of bytes 0..17
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMetadata {
    pub key_type: KeyType,
    pub order: usize,
    pub root: PageId,
}

impl TreeMetadata {
    pub const SIZE: usize = 21;
    const MAGIC: u32 = 0x4250_544D;
    const OFFSET_CHECKSUM: usize = 17;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&Self::MAGIC.to_be_bytes());
        buf[4] = self.key_type.tag();
        buf[5..9].copy_from_slice(&(self.key_type.width() as u32).to_be_bytes());
        buf[9..13].copy_from_slice(&(self.order as u32).to_be_bytes());
        buf[13..17].copy_from_slice(&self.root.to_be_bytes());

        let checksum = crc32fast::hash(&buf[..Self::OFFSET_CHECKSUM]);
        buf[Self::OFFSET_CHECKSUM..].copy_from_slice(&checksum.to_be_bytes());
        buf
    }

    /// Decode metadata, failing on anything unexpected.
    ///
    /// # Errors
    /// `Error::CorruptMetadata` for a bad magic number, checksum, key type
    /// tag or order.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::CorruptMetadata(format!(
                "metadata needs {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }
        let u32_at = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        if u32_at(0) != Self::MAGIC {
            return Err(Error::CorruptMetadata("bad magic number".to_string()));
        }
        let stored = u32_at(Self::OFFSET_CHECKSUM);
        let computed = crc32fast::hash(&buf[..Self::OFFSET_CHECKSUM]);
        if stored != computed {
            return Err(Error::CorruptMetadata(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let key_type = KeyType::from_tag(buf[4], u32_at(5))?;
        let order = u32_at(9) as usize;
        if order == 0 {
            return Err(Error::CorruptMetadata("order 0".to_string()));
        }

        Ok(Self {
            key_type,
            order,
            root: PageId::new(u32_at(13)),
        })
    }

    pub fn read_from(page: &Page) -> Result<Self> {
        Self::from_bytes(&page.read(0, Self::SIZE))
    }

    pub fn write_to(&self, page: &Page) -> Result<()> {
        page.write(0, &self.to_bytes())
    }
}
