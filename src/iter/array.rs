//! Backtracking iteration over an owned vector.

use super::BacktrackingIterator;

/// A [`BacktrackingIterator`] over a `Vec<T>`.
///
/// # Example
/// ```
/// use pagetree::iter::{ArrayBacktrackingIterator, BacktrackingIterator};
///
/// let mut iter = ArrayBacktrackingIterator::new(vec![1, 2, 3]);
/// assert_eq!(iter.next(), Some(1));
/// iter.mark();
/// assert_eq!(iter.next(), Some(2));
/// iter.reset();
/// assert_eq!(iter.next(), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct ArrayBacktrackingIterator<T> {
    items: Vec<T>,
    next_index: usize,
    /// Index of the last value returned since construction or reset.
    prev_index: Option<usize>,
    mark_index: Option<usize>,
}

impl<T: Clone> ArrayBacktrackingIterator<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_index: 0,
            prev_index: None,
            mark_index: None,
        }
    }

    /// Number of values, consumed or not.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Iterator for ArrayBacktrackingIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.items.get(self.next_index)?.clone();
        self.prev_index = Some(self.next_index);
        self.next_index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len().saturating_sub(self.next_index);
        (remaining, Some(remaining))
    }
}

impl<T: Clone> BacktrackingIterator for ArrayBacktrackingIterator<T> {
    fn has_next(&mut self) -> bool {
        self.next_index < self.items.len()
    }

    fn mark(&mut self) {
        if let Some(prev) = self.prev_index {
            self.mark_index = Some(prev);
        }
    }

    fn reset(&mut self) {
        if let Some(mark) = self.mark_index {
            self.next_index = mark;
            self.prev_index = None;
        }
    }
}
