//! Sliding windows over push-based streams.
//!
//! The source is shared through one [`SharedStream`] connection. `size`
//! views are taken from it, view `i` skipping the first `i` items, and the
//! views are zipped positionally: the j-th item of every view together form
//! window j. The source is therefore consumed exactly once no matter how many
//! views read it.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use super::shared::{SharedStream, Subscription};

/// One offset view of the shared source.
///
/// Skips the first `skip` successful items; errors are never skipped.
struct View<T, E> {
    subscription: Subscription<Result<T, E>>,
    skip: usize,
}

impl<T, E> Stream for View<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.subscription.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(_))) if self.skip > 0 => self.skip -= 1,
                other => return other,
            }
        }
    }
}

/// Stream of windows over a fallible source, created by
/// [`try_sliding_window`].
///
/// The first error is passed through immediately and ends the stream.
pub struct TryWindows<T, E> {
    views: Vec<View<T, E>>,
    slots: Vec<Option<T>>,
}

// Slots only ever hold items by value; nothing is structurally pinned.
impl<T, E> Unpin for TryWindows<T, E> {}

impl<T, E> TryWindows<T, E> {
    /// Release every view, and with them the shared source.
    fn finish(&mut self) {
        self.views.clear();
        self.slots.clear();
    }
}

impl<T, E> Stream for TryWindows<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Item = Result<Vec<T>, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.views.is_empty() {
            return Poll::Ready(None);
        }

        let mut pending = false;
        for (view, slot) in this.views.iter_mut().zip(this.slots.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            match view.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(item))) => *slot = Some(item),
                Poll::Ready(Some(Err(e))) => {
                    this.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Pending => pending = true,
            }
        }

        if pending {
            return Poll::Pending;
        }
        Poll::Ready(Some(Ok(this.slots.iter_mut().filter_map(Option::take).collect())))
    }
}

/// Group a fallible push stream into windows of `size` items.
///
/// Must be polled inside a tokio runtime; the source is driven by a spawned
/// task and dropped once the returned stream is.
///
/// # Panics
///
/// Panics if `size` is 0.
pub fn try_sliding_window<S, T, E>(source: S, size: usize) -> TryWindows<T, E>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    assert!(size != 0, "window size must be non-zero");
    let shared = SharedStream::from_stream(source);
    // Every view registers before any is polled, so none misses an item.
    let views = (0..size)
        .map(|skip| View {
            subscription: shared.subscribe(),
            skip,
        })
        .collect();
    TryWindows {
        views,
        slots: (0..size).map(|_| None).collect(),
    }
}

/// Stream of windows over an infallible source, created by
/// [`sliding_window`].
pub struct Windows<T> {
    inner: TryWindows<T, Infallible>,
}

impl<T: Clone + Send + 'static> Stream for Windows<T> {
    type Item = Vec<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx).map(|window| {
            window.map(|result| match result {
                Ok(window) => window,
                Err(never) => match never {},
            })
        })
    }
}

/// Group a push stream into windows of `size` items.
///
/// # Panics
///
/// Panics if `size` is 0.
pub fn sliding_window<S, T>(source: S, size: usize) -> Windows<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Clone + Send + 'static,
{
    Windows {
        inner: try_sliding_window(source.map(Ok::<T, Infallible>), size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::SlidingWindowExt;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test]
    async fn test_push_matches_finite_form() {
        for size in 1..=5 {
            for len in 0..=7 {
                let items: Vec<u32> = (0..len).collect();
                let expected: Vec<Vec<u32>> = items.iter().copied().sliding_window(size).collect();
                let actual: Vec<Vec<u32>> =
                    sliding_window(stream::iter(items), size).collect().await;
                assert_eq!(actual, expected, "size={size} len={len}");
            }
        }
    }

    #[tokio::test]
    async fn test_items_pushed_from_another_task() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut windows = sliding_window(UnboundedReceiverStream::new(rx), 2);

        let producer = tokio::spawn(async move {
            for n in 1..=4 {
                tx.send(n).unwrap();
                tokio::task::yield_now().await;
            }
        });

        assert_eq!(windows.next().await, Some(vec![1, 2]));
        assert_eq!(windows.next().await, Some(vec![2, 3]));
        assert_eq!(windows.next().await, Some(vec![3, 4]));
        producer.await.unwrap();
        assert_eq!(windows.next().await, None);
    }

    #[tokio::test]
    async fn test_source_polled_once_per_item() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulls);
        let source = stream::iter(0..6).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let windows: Vec<Vec<i32>> = sliding_window(source, 3).collect().await;
        assert_eq!(windows.len(), 4);
        assert_eq!(pulls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_windows_over_items_that_are_not_unpin() {
        use std::marker::PhantomPinned;

        let source = stream::iter((0..4u32).map(|n| (n, PhantomPinned)));
        let windows: Vec<Vec<(u32, PhantomPinned)>> = sliding_window(source, 3).collect().await;
        let firsts: Vec<u32> = windows.iter().map(|w| w[0].0).collect();
        assert_eq!(firsts, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_error_passes_through_short_source() {
        let source = stream::iter(vec![Ok(1), Err("boom")]);
        let results: Vec<Result<Vec<i32>, &str>> = try_sliding_window(source, 4).collect().await;
        assert_eq!(results, vec![Err("boom")]);
    }

    #[tokio::test]
    async fn test_error_ends_stream_after_windows() {
        let source = stream::iter(vec![Ok(1), Ok(2), Ok(3), Err("boom"), Ok(4)]);
        let results: Vec<Result<Vec<i32>, &str>> = try_sliding_window(source, 2).collect().await;
        assert_eq!(results, vec![Ok(vec![1, 2]), Ok(vec![2, 3]), Err("boom")]);
    }
}
