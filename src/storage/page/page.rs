//! Page - a handle on one fixed-size page of an allocator's file.
//!
//! A [`Page`] is what [`PageAllocator::fetch`](crate::storage::PageAllocator::fetch)
//! returns. It is a cheap, clonable handle on the cached [`Frame`]; the
//! [`PageCache`](crate::buffer::PageCache) owns the frame and decides when it
//! is written back.

use std::fmt;
use std::sync::Arc;

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};

use super::frame::Frame;

/// A page of data (4KB) addressed by its virtual page number.
///
/// Writes go to the in-memory frame. On a durable allocator each write is
/// flushed before it returns; otherwise the bytes reach the file when the
/// page is evicted, flushed explicitly, or its allocator is closed.
///
/// # Panics
/// Byte-range accessors panic if `offset + len` exceeds `PAGE_SIZE`.
#[derive(Clone)]
pub struct Page {
    frame: Arc<Frame>,
}

impl Page {
    pub(crate) fn from_frame(frame: Arc<Frame>) -> Self {
        Self { frame }
    }

    pub(crate) fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    /// The virtual page number of this page.
    #[inline]
    pub fn page_num(&self) -> PageId {
        self.frame.page_num()
    }

    /// Copy `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf);
        buf
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read_into(&self, offset: usize, buf: &mut [u8]) {
        check_range(offset, buf.len());
        let data = self.frame.data();
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
    }

    /// Copy the whole page.
    pub fn read_all(&self) -> Vec<u8> {
        self.read(0, PAGE_SIZE)
    }

    /// Overwrite bytes starting at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        check_range(offset, bytes.len());
        self.frame
            .update(|data| data[offset..offset + bytes.len()].copy_from_slice(bytes));
        self.write_through()
    }

    /// Zero out the entire page.
    pub fn wipe(&self) -> Result<()> {
        self.frame.update(|data| data.fill(0));
        self.write_through()
    }

    /// Write the page to the backing file if it has unflushed changes.
    pub fn flush(&self) -> Result<()> {
        self.frame.flush().map(|_| ())
    }

    /// Whether the page has changes not yet written to the file.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }

    /// Get the size of a page.
    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    fn write_through(&self) -> Result<()> {
        if self.frame.is_durable() {
            self.frame.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_num", &self.page_num())
            .field("block", &self.frame.block())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

fn check_range(offset: usize, len: usize) {
    assert!(
        offset.checked_add(len).is_some_and(|end| end <= PAGE_SIZE),
        "page access out of range: offset {} len {}",
        offset,
        len
    );
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use tempfile::tempdir;

    fn test_page(durable: bool) -> (Page, Arc<Mutex<DiskManager>>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("page.db")).unwrap();
        let disk = Arc::new(Mutex::new(dm));
        let frame = Frame::load(PageId::new(0), 1, durable, Arc::clone(&disk)).unwrap();
        (Page::from_frame(Arc::new(frame)), disk, dir)
    }

    #[test]
    fn test_page_read_write() {
        let (page, _disk, _dir) = test_page(false);

        page.write(0, &[0xFF]).unwrap();
        page.write(100, &[0xAB, 0xCD]).unwrap();
        page.write(4095, &[0xEF]).unwrap();

        assert_eq!(page.read(0, 1), vec![0xFF]);
        assert_eq!(page.read(100, 2), vec![0xAB, 0xCD]);
        assert_eq!(page.read(4095, 1), vec![0xEF]);
        assert!(page.is_dirty());
    }

    #[test]
    fn test_durable_write_is_flushed() {
        let (page, disk, _dir) = test_page(true);

        page.write(10, &[1, 2, 3]).unwrap();
        assert!(!page.is_dirty());

        let mut buf = [0u8; PAGE_SIZE];
        disk.lock().read_block(1, &mut buf).unwrap();
        assert_eq!(&buf[10..13], &[1, 2, 3]);
    }

    #[test]
    fn test_non_durable_write_waits_for_flush() {
        let (page, disk, _dir) = test_page(false);

        page.write(0, &[9]).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        disk.lock().read_block(1, &mut buf).unwrap();
        assert_eq!(buf[0], 0);

        page.flush().unwrap();
        disk.lock().read_block(1, &mut buf).unwrap();
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn test_page_wipe() {
        let (page, _disk, _dir) = test_page(false);
        page.write(50, &[7; 10]).unwrap();

        page.wipe().unwrap();
        assert!(page.read_all().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_durable_write_survives_concurrent_flush() {
        let (page, disk, _dir) = test_page(true);
        let stop = Arc::new(AtomicBool::new(false));

        let flusher = {
            let page = page.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    page.flush().unwrap();
                }
            })
        };

        let mut lost = 0;
        let mut buf = [0u8; PAGE_SIZE];
        for i in 0..2000u32 {
            page.write(0, &i.to_be_bytes()).unwrap();
            disk.lock().read_block(1, &mut buf).unwrap();
            if buf[..4] != i.to_be_bytes() {
                lost += 1;
            }
        }
        stop.store(true, Ordering::Relaxed);
        flusher.join().unwrap();

        assert_eq!(lost, 0);
        assert!(!page.is_dirty());
    }

    #[test]
    #[should_panic(expected = "page access out of range")]
    fn test_out_of_range_write_panics() {
        let (page, _disk, _dir) = test_page(false);
        let _ = page.write(4090, &[0; 10]);
    }
}
