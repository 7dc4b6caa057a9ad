//! Configuration constants and allocator options.

/// Size of a page in bytes (4KB).
///
/// Every node of the tree, every allocator header page and the master page
/// occupy exactly one page of this size in the backing file.
pub const PAGE_SIZE: usize = 4096;

/// Number of data pages governed by one header page.
///
/// A header page is a bitmap with one presence bit per data page, so a full
/// page of bits governs `PAGE_SIZE * 8` data pages.
pub const DATA_PAGES_PER_HEADER: u32 = (PAGE_SIZE * 8) as u32;

/// Maximum number of header pages per allocator.
///
/// The master page stores one 4-byte occupancy count per header page.
pub const MAX_HEADER_PAGES: u32 = (PAGE_SIZE / 4) as u32;

/// Default number of pages held by a [`PageCache`](crate::buffer::PageCache).
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Runtime options for a [`PageAllocator`](crate::storage::PageAllocator).
///
/// The geometry fields (`pages_per_header`, `max_header_pages`) decide where
/// pages live in the file. **They are not stored in the file**: reopen with
/// the values the file was created with. `PageAllocator::open` refuses a
/// file whose directory does not fit the given geometry with
/// `Error::CorruptMetadata`. Both can only be lowered from the compile-time
/// maximums.
///
/// # Example
/// ```
/// use pagetree::AllocatorConfig;
///
/// let config = AllocatorConfig::default().with_durable(false);
/// assert!(!config.durable);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Flush every page write before returning (write-through).
    pub durable: bool,
    /// Data pages governed by each header page.
    pub pages_per_header: u32,
    /// Upper bound on the number of header pages.
    pub max_header_pages: u32,
}

impl AllocatorConfig {
    /// Set the durability policy.
    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Set the number of data pages per header page (clamped to the bitmap size).
    pub fn with_pages_per_header(mut self, pages: u32) -> Self {
        self.pages_per_header = pages.clamp(1, DATA_PAGES_PER_HEADER);
        self
    }

    /// Set the maximum number of header pages (clamped to the master page size).
    pub fn with_max_header_pages(mut self, headers: u32) -> Self {
        self.max_header_pages = headers.clamp(1, MAX_HEADER_PAGES);
        self
    }

    /// Total number of data pages this configuration can address.
    pub fn max_pages(&self) -> u64 {
        self.pages_per_header as u64 * self.max_header_pages as u64
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            durable: true,
            pages_per_header: DATA_PAGES_PER_HEADER,
            max_header_pages: MAX_HEADER_PAGES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_directory_geometry() {
        assert_eq!(DATA_PAGES_PER_HEADER, 32768);
        assert_eq!(MAX_HEADER_PAGES, 1024);
    }

    #[test]
    fn test_config_clamps() {
        let config = AllocatorConfig::default()
            .with_pages_per_header(0)
            .with_max_header_pages(u32::MAX);
        assert_eq!(config.pages_per_header, 1);
        assert_eq!(config.max_header_pages, MAX_HEADER_PAGES);
        assert_eq!(config.max_pages(), MAX_HEADER_PAGES as u64);
    }
}
