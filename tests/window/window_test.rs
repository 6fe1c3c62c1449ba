//! Tests for the finite and push sliding window forms.

use std::time::Duration;

use ctxtail::window::{sliding_window, SharedStream, SlidingWindowExt};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[test]
fn finite_window_count() {
    for size in 1..=4 {
        for len in 0..=6usize {
            let windows: Vec<Vec<usize>> = (0..len).sliding_window(size).collect();
            assert_eq!(windows.len(), (len + 1).saturating_sub(size));
        }
    }
}

#[tokio::test]
async fn push_form_records_same_windows_as_finite_form() {
    let items: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(ToString::to_string).collect();
    let expected: Vec<Vec<String>> = items.clone().into_iter().sliding_window(3).collect();

    let (tx, rx) = mpsc::unbounded_channel();
    let windows = sliding_window(UnboundedReceiverStream::new(rx), 3);
    let recorder = tokio::spawn(windows.collect::<Vec<_>>());

    for item in items {
        tx.send(item).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    drop(tx);

    assert_eq!(recorder.await.unwrap(), expected);
}

#[tokio::test]
async fn dropping_windows_releases_source() {
    let (tx, rx) = mpsc::unbounded_channel::<u32>();
    let mut windows = sliding_window(UnboundedReceiverStream::new(rx), 2);

    tx.send(1).unwrap();
    tx.send(2).unwrap();
    assert_eq!(windows.next().await, Some(vec![1, 2]));

    drop(windows);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(tx.is_closed());
}

#[tokio::test]
async fn shared_stream_late_subscriber_joins_mid_stream() {
    let (tx, rx) = mpsc::unbounded_channel::<u32>();
    let shared = SharedStream::from_stream(UnboundedReceiverStream::new(rx));

    let mut early = shared.subscribe();
    tx.send(1).unwrap();
    assert_eq!(early.next().await, Some(1));

    let mut late = shared.subscribe();
    tx.send(2).unwrap();
    assert_eq!(early.next().await, Some(2));
    assert_eq!(late.next().await, Some(2));
    assert_eq!(shared.subscriber_count(), 2);
}

#[tokio::test]
async fn windows_pending_until_full() {
    let (tx, rx) = mpsc::unbounded_channel::<u32>();
    let mut windows = tokio_test::task::spawn(sliding_window(UnboundedReceiverStream::new(rx), 2));

    tokio_test::assert_pending!(windows.poll_next());
    tx.send(1).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    tokio_test::assert_pending!(windows.poll_next());

    tx.send(2).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    tokio_test::assert_ready_eq!(windows.poll_next(), Some(vec![1, 2]));
}
