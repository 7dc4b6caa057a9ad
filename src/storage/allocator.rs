//! Page Allocator - virtual page numbers over a single backing file.
//!
//! The [`PageAllocator`] hands out dense virtual page numbers and maps them
//! onto physical blocks through a two-level directory:
//! - A master page with one occupancy count per header page
//! - Header pages, each a bitmap with one presence bit per data page

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::{CacheKey, PageCache};
use crate::common::config::PAGE_SIZE;
use crate::common::{AllocatorConfig, Error, PageId, Result};
use crate::iter::{ArrayBacktrackingIterator, BacktrackingIterator, ConcatBacktrackingIterator};
use crate::storage::page::{Frame, Page, PageBytes};
use crate::storage::DiskManager;

/// Physical block of the master page.
const MASTER_BLOCK: u64 = 0;

/// In-memory copy of the master and header pages.
struct Directory {
    /// Allocated data pages per header page (the master page contents).
    counts: Vec<u32>,
    /// Header page bitmaps, loaded on first use.
    headers: Vec<Option<Box<PageBytes>>>,
    master_dirty: bool,
    header_dirty: Vec<bool>,
    closed: bool,
}

impl Directory {
    fn bit(bitmap: &PageBytes, index: u32) -> bool {
        bitmap[(index / 8) as usize] & (0x80 >> (index % 8)) != 0
    }

    fn set_bit(bitmap: &mut PageBytes, index: u32, value: bool) {
        let byte = &mut bitmap[(index / 8) as usize];
        let mask = 0x80 >> (index % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Flip one presence bit and keep the count and dirty flags in step.
    fn set_allocated(&mut self, header: u32, index: u32, value: bool) {
        let h = header as usize;
        if let Some(bitmap) = self.headers[h].as_mut() {
            Self::set_bit(bitmap, index, value);
        }
        if value {
            self.counts[h] += 1;
        } else {
            self.counts[h] -= 1;
        }
        self.header_dirty[h] = true;
        self.master_dirty = true;
    }
}

/// Block of header page `header` when each header governs `pages_per_header`
/// data pages.
#[inline]
fn header_block(pages_per_header: u32, header: u32) -> u64 {
    1 + header as u64 * (pages_per_header as u64 + 1)
}

/// Manages the pages of one backing file.
///
/// # File Layout
/// ```text
/// ┌────────┬──────────┬────────┬─────┬──────────┬──────────┬────────┬─────┐
/// │ Master │ Header 0 │ Data 0 │ ... │ Data P-1 │ Header 1 │ Data P │ ... │
/// └────────┴──────────┴────────┴─────┴──────────┴──────────┴────────┴─────┘
/// Block:  0        1          2              P+1        P+2
/// ```
/// `P` is `pages_per_header`. Virtual page `v` belongs to header `v / P` at
/// bit `v % P`; header `h` lives in block `1 + h * (P + 1)` and its data
/// pages follow it. Master counts are 4-byte big-endian; header bits are
/// most-significant-bit first.
///
/// # Thread Safety
/// - `dir`: `Mutex` — allocate/fetch-miss/free run as one critical section
/// - `num_pages`: atomic, readable without the directory lock
/// - `disk`: `Mutex` shared with this allocator's cached frames
/// - `cache`: internally locked and shared with other allocators
///
/// Lock order is directory, then cache, then disk.
///
/// # Durability
/// A durable allocator writes directory and page changes through before
/// returning. Otherwise they reach the file on eviction, `flush_all`, or
/// `close`.
pub struct PageAllocator {
    id: u32,
    cache: Arc<PageCache>,
    disk: Arc<Mutex<DiskManager>>,
    config: AllocatorConfig,
    dir: Mutex<Directory>,
    num_pages: AtomicU32,
}

impl PageAllocator {
    /// Create a new, empty backing file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        cache: Arc<PageCache>,
        config: AllocatorConfig,
    ) -> Result<Self> {
        let disk = DiskManager::create(path.as_ref())?;
        let headers = config.max_header_pages as usize;
        let allocator =
            Self::with_directory(disk, cache, config, vec![0; headers], vec![None; headers]);
        allocator.dir.lock().master_dirty = true;
        allocator.persist_master()?;

        info!(
            "created page allocator {} at {}",
            allocator.id,
            path.as_ref().display()
        );
        Ok(allocator)
    }

    /// Open an existing backing file.
    ///
    /// `config` must carry the geometry the file was created with. The
    /// master page and every non-empty header page are checked against it
    /// and a mismatch is refused rather than silently mis-mapping pages.
    ///
    /// # Errors
    /// - I/O errors opening or reading the file
    /// - `Error::CorruptMetadata` if a master count is out of range, a count
    ///   sits beyond `max_header_pages`, or a header bitmap disagrees with its
    ///   count under `pages_per_header`
    pub fn open<P: AsRef<Path>>(
        path: P,
        cache: Arc<PageCache>,
        config: AllocatorConfig,
    ) -> Result<Self> {
        let mut disk = DiskManager::open(path.as_ref())?;

        let mut master = [0u8; PAGE_SIZE];
        disk.read_block(MASTER_BLOCK, &mut master)?;

        let all_counts: Vec<u32> = master
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let (counts, beyond) = all_counts.split_at(config.max_header_pages as usize);

        if let Some(extra) = beyond.iter().position(|&c| c != 0) {
            return Err(Error::CorruptMetadata(format!(
                "header {} holds pages but only {} header pages are configured",
                config.max_header_pages as usize + extra,
                config.max_header_pages
            )));
        }
        if let Some(bad) = counts.iter().find(|&&c| c > config.pages_per_header) {
            return Err(Error::CorruptMetadata(format!(
                "master page count {} exceeds {} pages per header",
                bad, config.pages_per_header
            )));
        }

        let headers = Self::load_headers(&mut disk, &config, counts)?;
        let allocator = Self::with_directory(disk, cache, config, counts.to_vec(), headers);
        info!(
            "opened page allocator {} at {} ({} pages)",
            allocator.id,
            path.as_ref().display(),
            allocator.num_pages()
        );
        Ok(allocator)
    }

    /// Read the bitmap of every non-empty header and check it against its
    /// master count.
    fn load_headers(
        disk: &mut DiskManager,
        config: &AllocatorConfig,
        counts: &[u32],
    ) -> Result<Vec<Option<Box<PageBytes>>>> {
        let pph = config.pages_per_header;
        let mut headers = vec![None; counts.len()];

        for (header, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let mut bitmap = Box::new([0u8; PAGE_SIZE]);
            disk.read_block(header_block(pph, header as u32), &mut bitmap)?;

            let total: u32 = bitmap.iter().map(|b| b.count_ones()).sum();
            let in_range = (0..pph).filter(|&i| Directory::bit(&bitmap, i)).count() as u32;
            if total != count || in_range != count {
                return Err(Error::CorruptMetadata(format!(
                    "header {} has {} pages marked but the master page records {}; \
                     the file was written with a different pages_per_header",
                    header, total, count
                )));
            }
            headers[header] = Some(bitmap);
        }

        Ok(headers)
    }

    /// Open a backing file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        cache: Arc<PageCache>,
        config: AllocatorConfig,
    ) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, cache, config)
        } else {
            Self::create(path, cache, config)
        }
    }

    fn with_directory(
        disk: DiskManager,
        cache: Arc<PageCache>,
        config: AllocatorConfig,
        counts: Vec<u32>,
        headers: Vec<Option<Box<PageBytes>>>,
    ) -> Self {
        let num_headers = headers.len();
        let num_pages = counts.iter().sum();

        Self {
            id: cache.register_allocator(),
            cache,
            disk: Arc::new(Mutex::new(disk)),
            config,
            dir: Mutex::new(Directory {
                counts,
                headers,
                master_dirty: false,
                header_dirty: vec![false; num_headers],
                closed: false,
            }),
            num_pages: AtomicU32::new(num_pages),
        }
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Allocate a page and return its virtual page number.
    ///
    /// The new page is zeroed and cached. A failed call leaves the directory
    /// as it was.
    ///
    /// # Errors
    /// - `Error::AllocatorExhausted` if every header page is full
    /// - `Error::AllocatorClosed` after `close()`
    /// - I/O errors zeroing the page or, when durable, persisting the directory
    pub fn allocate(&self) -> Result<PageId> {
        let mut dir = self.dir.lock();
        if dir.closed {
            return Err(Error::AllocatorClosed);
        }

        let pph = self.config.pages_per_header;
        let header = (0..self.config.max_header_pages)
            .find(|&h| dir.counts[h as usize] < pph)
            .ok_or(Error::AllocatorExhausted)?;

        self.load_header(&mut dir, header)?;
        let index = dir.headers[header as usize]
            .as_ref()
            .and_then(|bitmap| (0..pph).find(|&i| !Directory::bit(bitmap, i)))
            .ok_or_else(|| {
                Error::CorruptMetadata(format!("header {} is full but its count is not", header))
            })?;

        // The block is still free, so zeroing it first can't clobber a page.
        let page_num = PageId::new(header * pph + index);
        let frame = Arc::new(Frame::zeroed(
            page_num,
            self.block_of(page_num),
            self.config.durable,
            Arc::clone(&self.disk),
        ));
        if self.config.durable {
            frame.flush()?;
        }

        dir.set_allocated(header, index, true);
        if self.config.durable {
            let persisted = self
                .persist_header(&mut dir, header)
                .and_then(|()| self.persist_master_locked(&mut dir));
            if let Err(e) = persisted {
                dir.set_allocated(header, index, false);
                return Err(e);
            }
        }

        self.cache.put(self.key(page_num), frame);
        self.num_pages.fetch_add(1, Ordering::Relaxed);
        debug!("allocator {} allocated {}", self.id, page_num);
        Ok(page_num)
    }

    /// Fetch an allocated page.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` if the number is outside the addressable range
    /// - `Error::PageNotAllocated` if the page is free
    /// - `Error::AllocatorClosed` after `close()`
    pub fn fetch(&self, page_num: PageId) -> Result<Page> {
        self.check_bounds(page_num)?;

        let mut dir = self.dir.lock();
        if dir.closed {
            return Err(Error::AllocatorClosed);
        }

        let key = self.key(page_num);
        if let Some(frame) = self.cache.get(key) {
            return Ok(Page::from_frame(frame));
        }

        if !self.is_allocated_locked(&mut dir, page_num)? {
            return Err(Error::PageNotAllocated(page_num.0));
        }

        let frame = Arc::new(Frame::load(
            page_num,
            self.block_of(page_num),
            self.config.durable,
            Arc::clone(&self.disk),
        )?);
        self.cache.stats().pages_read.fetch_add(1, Ordering::Relaxed);
        self.cache.put(key, Arc::clone(&frame));

        Ok(Page::from_frame(frame))
    }

    /// Free a page.
    ///
    /// Returns `Ok(false)` if the page was already free.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` if the number is outside the addressable range
    /// - `Error::AllocatorClosed` after `close()`
    pub fn free(&self, page_num: PageId) -> Result<bool> {
        self.check_bounds(page_num)?;

        let mut dir = self.dir.lock();
        if dir.closed {
            return Err(Error::AllocatorClosed);
        }
        if !self.is_allocated_locked(&mut dir, page_num)? {
            return Ok(false);
        }

        let key = self.key(page_num);
        if let Some(frame) = self.cache.remove(key) {
            if self.config.durable {
                frame.flush()?;
            }
        }

        let (header, index) = self.split(page_num);
        dir.set_allocated(header, index, false);

        if self.config.durable {
            self.persist_header(&mut dir, header)?;
            self.persist_master_locked(&mut dir)?;
        }

        self.num_pages.fetch_sub(1, Ordering::Relaxed);
        debug!("allocator {} freed {}", self.id, page_num);
        Ok(true)
    }

    /// Free the page behind a handle. See [`free`](Self::free).
    pub fn free_page(&self, page: &Page) -> Result<bool> {
        self.free(page.page_num())
    }

    /// Whether a page number is currently allocated.
    pub fn is_allocated(&self, page_num: PageId) -> Result<bool> {
        self.check_bounds(page_num)?;
        let mut dir = self.dir.lock();
        self.is_allocated_locked(&mut dir, page_num)
    }

    /// Write every cached page and the directory back to the file.
    pub fn flush_all(&self) -> Result<()> {
        let mut dir = self.dir.lock();
        self.flush_locked(&mut dir)
    }

    /// Flush everything, drop this allocator's pages from the shared cache
    /// and stop serving requests. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut dir = self.dir.lock();
        if dir.closed {
            return Ok(());
        }
        dir.closed = true;

        self.flush_locked(&mut dir)?;
        for frame in self.cache.remove_allocator(self.id) {
            frame.flush()?;
        }
        self.disk.lock().sync()?;

        info!("closed page allocator {}", self.id);
        Ok(())
    }

    /// Iterate over allocated pages in increasing page number order.
    pub fn iter(&self) -> PageIter<'_> {
        PageIter {
            allocator: self,
            inner: ConcatBacktrackingIterator::new(HeaderBlocks {
                allocator: self,
                next_header: 0,
            }),
        }
    }

    /// Id of this allocator within the shared cache.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of allocated pages.
    #[inline]
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Whether writes go straight through to the file.
    #[inline]
    pub fn is_durable(&self) -> bool {
        self.config.durable
    }

    /// The configuration this allocator was opened with.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    // ========================================================================
    // Internal: Directory
    // ========================================================================

    #[inline]
    fn key(&self, page_num: PageId) -> CacheKey {
        CacheKey::new(self.id, page_num)
    }

    #[inline]
    fn split(&self, page_num: PageId) -> (u32, u32) {
        let pph = self.config.pages_per_header;
        (page_num.0 / pph, page_num.0 % pph)
    }

    #[inline]
    fn header_block(&self, header: u32) -> u64 {
        header_block(self.config.pages_per_header, header)
    }

    #[inline]
    fn block_of(&self, page_num: PageId) -> u64 {
        let (header, index) = self.split(page_num);
        self.header_block(header) + 1 + index as u64
    }

    fn check_bounds(&self, page_num: PageId) -> Result<()> {
        if page_num.0 as u64 >= self.config.max_pages() {
            return Err(Error::InvalidPageId(page_num.0));
        }
        Ok(())
    }

    fn is_allocated_locked(&self, dir: &mut Directory, page_num: PageId) -> Result<bool> {
        let (header, index) = self.split(page_num);
        if dir.counts[header as usize] == 0 {
            return Ok(false);
        }
        self.load_header(dir, header)?;
        Ok(dir.headers[header as usize]
            .as_ref()
            .is_some_and(|bitmap| Directory::bit(bitmap, index)))
    }

    fn load_header(&self, dir: &mut Directory, header: u32) -> Result<()> {
        let slot = &mut dir.headers[header as usize];
        if slot.is_none() {
            let mut bitmap = Box::new([0u8; PAGE_SIZE]);
            self.disk
                .lock()
                .read_block(self.header_block(header), &mut bitmap)?;
            *slot = Some(bitmap);
        }
        Ok(())
    }

    /// Allocated page numbers under one header, in order.
    fn pages_under(&self, header: u32) -> Result<Vec<PageId>> {
        let mut dir = self.dir.lock();
        if dir.closed || dir.counts[header as usize] == 0 {
            return Ok(Vec::new());
        }
        self.load_header(&mut dir, header)?;

        let pph = self.config.pages_per_header;
        Ok(dir.headers[header as usize]
            .as_ref()
            .map(|bitmap| {
                (0..pph)
                    .filter(|&i| Directory::bit(bitmap, i))
                    .map(|i| PageId::new(header * pph + i))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn persist_header(&self, dir: &mut Directory, header: u32) -> Result<()> {
        if !dir.header_dirty[header as usize] {
            return Ok(());
        }
        if let Some(bitmap) = dir.headers[header as usize].as_ref() {
            self.disk
                .lock()
                .write_block(self.header_block(header), bitmap, self.config.durable)?;
        }
        dir.header_dirty[header as usize] = false;
        Ok(())
    }

    fn persist_master(&self) -> Result<()> {
        let mut dir = self.dir.lock();
        self.persist_master_locked(&mut dir)
    }

    fn persist_master_locked(&self, dir: &mut Directory) -> Result<()> {
        if !dir.master_dirty {
            return Ok(());
        }
        let mut master = [0u8; PAGE_SIZE];
        for (slot, count) in master.chunks_exact_mut(4).zip(&dir.counts) {
            slot.copy_from_slice(&count.to_be_bytes());
        }
        self.disk
            .lock()
            .write_block(MASTER_BLOCK, &master, self.config.durable)?;
        dir.master_dirty = false;
        Ok(())
    }

    fn flush_locked(&self, dir: &mut Directory) -> Result<()> {
        for frame in self.cache.frames_of(self.id) {
            frame.flush()?;
        }
        for header in 0..self.config.max_header_pages {
            self.persist_header(dir, header)?;
        }
        self.persist_master_locked(dir)
    }
}

impl Drop for PageAllocator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close page allocator {} on drop: {}", self.id, e);
        }
    }
}

impl std::fmt::Debug for PageAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageAllocator")
            .field("id", &self.id)
            .field("num_pages", &self.num_pages())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Page iteration
// ============================================================================

/// One entry of a header block.
#[derive(Debug, Clone)]
enum Slot {
    Page(PageId),
    /// The header page could not be read; stands in for its pages.
    Unreadable {
        header: u32,
        kind: io::ErrorKind,
        reason: String,
    },
}

/// Outer cursor of [`PageIter`]: one block of slots per header page.
#[derive(Clone)]
struct HeaderBlocks<'a> {
    allocator: &'a PageAllocator,
    next_header: u32,
}

impl Iterator for HeaderBlocks<'_> {
    type Item = ArrayBacktrackingIterator<Slot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_header >= self.allocator.config.max_header_pages {
            return None;
        }
        let header = self.next_header;
        self.next_header += 1;

        let slots = match self.allocator.pages_under(header) {
            Ok(pages) => pages.into_iter().map(Slot::Page).collect(),
            Err(e) => {
                let (kind, reason) = match e {
                    Error::Io(io) => (io.kind(), io.to_string()),
                    other => (io::ErrorKind::Other, other.to_string()),
                };
                vec![Slot::Unreadable {
                    header,
                    kind,
                    reason,
                }]
            }
        };
        Some(ArrayBacktrackingIterator::new(slots))
    }
}

/// Lazy iterator over the allocated pages of a [`PageAllocator`].
///
/// Header bitmaps are read one at a time as the iteration reaches them,
/// so pages allocated or freed ahead of the cursor are observed. A header
/// that cannot be read is yielded as one `Some(Err(_))` in place of its
/// pages, and iteration carries on with the next header.
pub struct PageIter<'a> {
    allocator: &'a PageAllocator,
    inner: ConcatBacktrackingIterator<HeaderBlocks<'a>>,
}

impl Iterator for PageIter<'_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Result<Page>> {
        match self.inner.next()? {
            Slot::Page(page_num) => Some(self.allocator.fetch(page_num)),
            Slot::Unreadable {
                header,
                kind,
                reason,
            } => Some(Err(Error::Io(io::Error::new(
                kind,
                format!("header page {}: {}", header, reason),
            )))),
        }
    }
}

impl BacktrackingIterator for PageIter<'_> {
    fn has_next(&mut self) -> bool {
        self.inner.has_next()
    }

    fn mark(&mut self) {
        self.inner.mark();
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}
