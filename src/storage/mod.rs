//! Storage layer - disk I/O, pages and page allocation.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level block I/O
//! - [`page`] - Page handles
//! - [`PageAllocator`] - Virtual page numbers over one backing file

mod allocator;
mod disk_manager;
pub mod page;

pub use allocator::{PageAllocator, PageIter};
pub use disk_manager::DiskManager;
pub use page::Page;
