//! Fixed-size sliding windows over pull and push sequences.
//!
//! Both forms emit one ordered `Vec<T>` of exactly `size` items per source
//! item once `size` items have been seen; the oldest item is evicted as each
//! new one arrives. A source shorter than the window yields nothing.

mod shared;
mod stream;

use std::collections::VecDeque;
use std::iter::FusedIterator;

pub use shared::{SharedStream, Subscription};
pub use stream::{sliding_window, try_sliding_window, TryWindows, Windows};

/// Iterator adapter yielding full sliding windows.
///
/// Created by [`SlidingWindowExt::sliding_window`].
#[derive(Debug, Clone)]
pub struct SlidingWindow<I: Iterator> {
    source: I,
    buffer: VecDeque<I::Item>,
    size: usize,
}

impl<I: Iterator> SlidingWindow<I> {
    /// Wrap `source` with a window of `size` items.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn new(source: I, size: usize) -> Self {
        assert!(size != 0, "window size must be non-zero");
        Self {
            source,
            buffer: VecDeque::new(),
            size,
        }
    }
}

impl<I> Iterator for SlidingWindow<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.source.next()?;
            if self.buffer.len() == self.size {
                self.buffer.pop_front();
            }
            self.buffer.push_back(item);
            if self.buffer.len() == self.size {
                return Some(self.buffer.iter().cloned().collect());
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (low, high) = self.source.size_hint();
        // The first `missing - 1` items only fill the buffer.
        let filling = (self.size - self.buffer.len()).saturating_sub(1);
        let adjust = |n: usize| n.saturating_sub(filling);
        (adjust(low), high.map(adjust))
    }
}

impl<I> FusedIterator for SlidingWindow<I>
where
    I: FusedIterator,
    I::Item: Clone,
{
}

/// Extension trait adding [`sliding_window`](Self::sliding_window) to every
/// iterator.
pub trait SlidingWindowExt: Iterator + Sized {
    /// Group the iterator into overlapping windows of `size` items.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    fn sliding_window(self, size: usize) -> SlidingWindow<Self> {
        SlidingWindow::new(self, size)
    }
}

impl<I: Iterator> SlidingWindowExt for I {}
