//! Disk Manager - low-level block I/O for the backing file.
//!
//! The [`DiskManager`] knows nothing about virtual page numbers; it reads and
//! writes physical blocks of `PAGE_SIZE` bytes. The
//! [`PageAllocator`](super::PageAllocator) decides which block backs which page.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::Result;

/// Manages block I/O for a single backing file.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Blocks past the end of the file read back as zeros, so the allocator can
/// place header and data blocks sparsely.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. Its owner wraps it in a mutex.
pub struct DiskManager {
    file: File,
}

impl DiskManager {
    /// Create a new backing file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self { file })
    }

    /// Open an existing backing file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Wrap an already opened file. Tests use this to hand in handles whose
    /// reads or writes fail.
    #[cfg(test)]
    pub(crate) fn from_file(file: File) -> Self {
        Self { file }
    }

    /// Read a block into `buf`.
    ///
    /// Any part of the block beyond the end of the file is zero-filled.
    pub fn read_block(&mut self, block: u64, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = block * PAGE_SIZE as u64;
        buf.fill(0);

        if offset >= self.file_size()? {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(())
    }

    /// Write a block, optionally forcing it to stable storage.
    pub fn write_block(&mut self, block: u64, data: &[u8; PAGE_SIZE], sync: bool) -> Result<()> {
        let offset = block * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        if sync {
            self.file.sync_data()?;
        }

        Ok(())
    }

    /// Force all buffered writes to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Get the current size of the backing file in bytes.
    #[inline]
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
