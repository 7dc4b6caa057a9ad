//! Error types for pagetree.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the allocator, the cache and the tree.
///
/// Nothing in this layer retries; every variant propagates straight to the
/// caller.
#[derive(Debug, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// I/O error from the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Allocator Errors
    // -------------------------------------------------------------------------
    /// Every header page is full.
    #[error("Page allocator exhausted: no free page slot")]
    AllocatorExhausted,

    /// The page number is in range but its presence bit is clear.
    #[error("Page {0} is not allocated")]
    PageNotAllocated(u32),

    /// The page number is outside the addressable range.
    #[error("Invalid page number: {0}")]
    InvalidPageId(u32),

    /// The allocator has already been closed.
    #[error("Page allocator is closed")]
    AllocatorClosed,

    /// A new tree was requested on an allocator that already holds pages.
    #[error("Allocator already holds {0} pages; a new tree needs an empty allocator")]
    AllocatorInUse(u32),

    // -------------------------------------------------------------------------
    // Tree Errors
    // -------------------------------------------------------------------------
    /// Bulk load rejected before any mutation.
    #[error("Bulk load failed: {0}")]
    BulkLoad(String),

    /// The requested order does not fit a page for the key type.
    #[error("Invalid order {order}: must be between 1 and {max}")]
    InvalidOrder { order: usize, max: usize },

    /// Tree metadata or the allocator directory is inconsistent.
    #[error("Corrupt tree metadata: {0}")]
    CorruptMetadata(String),

    /// A node page had an unexpected tag or an impossible entry count.
    #[error("Corrupt node on page {page}: {reason}")]
    CorruptNode { page: u32, reason: String },

    /// A key of the wrong type was handed to a tree.
    #[error("Key type mismatch: expected {expected}, found {found}")]
    KeyTypeMismatch { expected: String, found: String },

    /// A key value cannot be represented by its declared type.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotAllocated(42);
        assert_eq!(format!("{}", err), "Page 42 is not allocated");

        let err = Error::AllocatorExhausted;
        assert_eq!(
            format!("{}", err),
            "Page allocator exhausted: no free page slot"
        );

        let err = Error::CorruptNode {
            page: 7,
            reason: "bad tag".to_string(),
        };
        assert_eq!(format!("{}", err), "Corrupt node on page 7: bad tag");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: Error = io_err.into();
        assert!(err.source().is_some());
        assert!(Error::AllocatorClosed.source().is_none());
    }
}
