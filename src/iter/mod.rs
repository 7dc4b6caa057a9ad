//! Cursors with a single-slot mark/reset.
//!
//! Every scan in the crate is a [`BacktrackingIterator`]: an ordinary
//! [`Iterator`] that can remember one position and rewind to it.
//!
//! - [`ArrayBacktrackingIterator`] - over an owned vector
//! - [`ConcatBacktrackingIterator`] - chains blocks of sub-iterators

mod array;
mod concat;

pub use array::ArrayBacktrackingIterator;
pub use concat::ConcatBacktrackingIterator;

/// An iterator with a single mark slot.
///
/// - [`mark`](Self::mark) remembers the position of the value most recently
///   returned by `next()`. It does nothing if `next()` has not returned a
///   value since construction or since the last [`reset`](Self::reset).
/// - [`reset`](Self::reset) rewinds so the following `next()` returns the
///   marked value again. It does nothing if nothing was ever marked, and can
///   be repeated to replay the same values.
/// - A new `mark()` overwrites the previous one.
pub trait BacktrackingIterator: Iterator {
    /// Whether a following `next()` would return a value.
    fn has_next(&mut self) -> bool;

    /// Remember the position of the last value returned.
    fn mark(&mut self);

    /// Rewind to the last marked position.
    fn reset(&mut self);
}
