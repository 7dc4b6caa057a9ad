//! Frame - the in-memory copy of one page.
//!
//! A [`Frame`] holds the page bytes plus what is needed to write them back:
//! - The physical block in the owner's backing file
//! - A dirty flag for write-back tracking
//! - A handle on the owner's [`DiskManager`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::DiskManager;

/// Raw page bytes.
pub type PageBytes = [u8; PAGE_SIZE];

/// The cached contents of a single page.
///
/// # Thread Safety
/// All mutable fields use interior mutability:
/// - `data`: `RwLock` for read/write synchronization
/// - `is_dirty`: `AtomicBool` for lock-free dirty tracking
/// - `disk`: shared `Mutex` with the owning allocator
pub(crate) struct Frame {
    /// Virtual page number this frame caches.
    page_num: PageId,

    /// Physical block in the backing file.
    block: u64,

    /// The page data.
    data: RwLock<Box<PageBytes>>,

    /// Whether the page has been modified since it was last flushed.
    is_dirty: AtomicBool,

    /// Write-through policy inherited from the allocator.
    durable: bool,

    /// Backing file of the owning allocator.
    disk: Arc<Mutex<DiskManager>>,
}

impl Frame {
    /// Load a frame from disk.
    pub(crate) fn load(
        page_num: PageId,
        block: u64,
        durable: bool,
        disk: Arc<Mutex<DiskManager>>,
    ) -> Result<Self> {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        disk.lock().read_block(block, &mut data)?;

        Ok(Self {
            page_num,
            block,
            data: RwLock::new(data),
            is_dirty: AtomicBool::new(false),
            durable,
            disk,
        })
    }

    /// A dirty, all-zero frame for a block whose old contents don't matter.
    pub(crate) fn zeroed(
        page_num: PageId,
        block: u64,
        durable: bool,
        disk: Arc<Mutex<DiskManager>>,
    ) -> Self {
        Self {
            page_num,
            block,
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            is_dirty: AtomicBool::new(true),
            durable,
            disk,
        }
    }

    #[inline]
    pub(crate) fn page_num(&self) -> PageId {
        self.page_num
    }

    #[inline]
    pub(crate) fn block(&self) -> u64 {
        self.block
    }

    #[inline]
    pub(crate) fn is_durable(&self) -> bool {
        self.durable
    }

    /// Acquire read lock on the page bytes.
    #[inline]
    pub(crate) fn data(&self) -> RwLockReadGuard<'_, Box<PageBytes>> {
        self.data.read()
    }

    /// Modify the page bytes under the write lock.
    ///
    /// The frame is marked dirty before the lock is released, so a
    /// concurrent [`flush`](Self::flush) either writes the new bytes or
    /// leaves the frame dirty.
    pub(crate) fn update<F: FnOnce(&mut PageBytes)>(&self, f: F) {
        let mut data = self.data.write();
        f(&mut data);
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Write the page back if it is dirty.
    ///
    /// Returns whether a write happened. The read lock and then the disk
    /// lock are held across the clean check and the write: when this
    /// returns, any flush that cleared the flag first has finished writing.
    pub(crate) fn flush(&self) -> Result<bool> {
        let data = self.data.read();
        let mut disk = self.disk.lock();
        if !self.is_dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let written = disk.write_block(self.block, &data, self.durable);
        if written.is_err() {
            self.is_dirty.store(true, Ordering::Release);
        }
        written.map(|_| true)
    }
}
