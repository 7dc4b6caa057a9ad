//! Backtracking iteration over a sequence of blocks.

use super::BacktrackingIterator;

/// A sub-iterator together with the outer cursor positioned just after it.
#[derive(Clone)]
struct Block<O, I> {
    outer_after: O,
    inner: I,
}

/// Flattens an iterator of blocks, each block itself a
/// [`BacktrackingIterator`].
///
/// `mark()` is forwarded to the block that produced the last value and a
/// copy of that block is kept, together with the outer cursor as it stood
/// right after the block was pulled. `reset()` restores both and forwards
/// `reset()` to the block, so the marked value may sit anywhere, including
/// the first element of a later block or the last element of an exhausted
/// one. Empty blocks are skipped.
///
/// Cloning the outer cursor must be cheap; it is cloned once per block.
pub struct ConcatBacktrackingIterator<O>
where
    O: Iterator + Clone,
    O::Item: BacktrackingIterator + Clone,
{
    outer: O,
    current: Option<Block<O, O::Item>>,
    /// Whether `current` produced the last value returned.
    current_produced_last: bool,
    /// An exhausted block that produced the last value returned.
    finished: Option<Block<O, O::Item>>,
    marked: Option<Block<O, O::Item>>,
    /// Whether `next()` has returned a value since construction or reset.
    can_mark: bool,
}

impl<O> ConcatBacktrackingIterator<O>
where
    O: Iterator + Clone,
    O::Item: BacktrackingIterator + Clone,
{
    pub fn new(outer: O) -> Self {
        Self {
            outer,
            current: None,
            current_produced_last: false,
            finished: None,
            marked: None,
            can_mark: false,
        }
    }

    /// Make `current` a block with a value left, pulling from the outer
    /// cursor as needed. Returns false once everything is exhausted.
    fn advance(&mut self) -> bool {
        loop {
            if let Some(block) = self.current.as_mut() {
                if block.inner.has_next() {
                    return true;
                }
                let done = self.current.take();
                if self.current_produced_last {
                    self.finished = done;
                    self.current_produced_last = false;
                }
            }

            match self.outer.next() {
                Some(inner) => {
                    self.current = Some(Block {
                        outer_after: self.outer.clone(),
                        inner,
                    });
                }
                None => return false,
            }
        }
    }
}

impl<O> Iterator for ConcatBacktrackingIterator<O>
where
    O: Iterator + Clone,
    O::Item: BacktrackingIterator + Clone,
{
    type Item = <O::Item as Iterator>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.advance() {
            return None;
        }
        let value = self.current.as_mut()?.inner.next()?;
        self.current_produced_last = true;
        self.finished = None;
        self.can_mark = true;
        Some(value)
    }
}

impl<O> BacktrackingIterator for ConcatBacktrackingIterator<O>
where
    O: Iterator + Clone,
    O::Item: BacktrackingIterator + Clone,
{
    fn has_next(&mut self) -> bool {
        self.advance()
    }

    fn mark(&mut self) {
        if !self.can_mark {
            return;
        }
        let producer = if self.current_produced_last {
            self.current.as_mut()
        } else {
            self.finished.as_mut()
        };
        if let Some(block) = producer {
            block.inner.mark();
            self.marked = Some(block.clone());
        }
    }

    fn reset(&mut self) {
        let Some(marked) = self.marked.as_ref() else {
            return;
        };
        let mut block = marked.clone();
        block.inner.reset();

        self.outer = block.outer_after.clone();
        self.current = Some(block);
        self.current_produced_last = false;
        self.finished = None;
        self.can_mark = false;
    }
}
