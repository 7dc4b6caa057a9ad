//! Page handles and their cached frames.
//!
//! This module contains:
//! - [`Page`] - A clonable handle on one cached 4KB page
//! - `Frame` - The cached bytes plus write-back state

mod frame;
#[allow(clippy::module_inception)]
mod page;

pub(crate) use frame::Frame;
pub use frame::PageBytes;
pub use page::Page;
