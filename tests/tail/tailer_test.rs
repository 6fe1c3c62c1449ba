//! End-to-end tailing tests driven by a manual change watcher.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ctxtail::context::{ContextExtractor, TimestampSniffer};
use ctxtail::tail::{ChannelWatcher, FileTailer, Line, LineResult, TailOptions};
use chrono::FixedOffset;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn no_polling() -> TailOptions {
    TailOptions {
        poll_interval: Duration::ZERO,
    }
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    write!(file, "{text}").unwrap();
    file.flush().unwrap();
}

async fn next_line(lines: &mut (impl Stream<Item = LineResult> + Unpin)) -> Line {
    tokio::time::timeout(WAIT, lines.next())
        .await
        .expect("timed out waiting for line")
        .expect("stream ended")
        .expect("tail error")
}

async fn assert_quiet<S: Stream + Unpin>(stream: &mut S) {
    let next = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(next.is_err(), "unexpected item");
}

#[tokio::test]
async fn backlog_then_appended_lines_exactly_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "x\ny\n").unwrap();

    let watcher = ChannelWatcher::new();
    let tailer = FileTailer::new(&path, Arc::new(watcher.clone()), no_polling());
    let mut lines = tailer.subscribe();

    assert_eq!(next_line(&mut lines).await, Line::new(1, "x"));
    assert_eq!(next_line(&mut lines).await, Line::new(2, "y"));

    append(&path, "z\n");
    watcher.notify_changed(&path);

    assert_eq!(next_line(&mut lines).await, Line::new(3, "z"));
    assert_quiet(&mut lines).await;
}

#[tokio::test]
async fn partial_line_waits_for_terminator() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "").unwrap();

    let watcher = ChannelWatcher::new();
    let tailer = FileTailer::new(&path, Arc::new(watcher.clone()), no_polling());
    let mut lines = tailer.subscribe();

    append(&path, "hal");
    watcher.notify_changed(&path);
    assert_quiet(&mut lines).await;

    append(&path, "f\n");
    watcher.notify_changed(&path);
    assert_eq!(next_line(&mut lines).await, Line::new(1, "half"));
}

#[tokio::test]
async fn spurious_notifications_yield_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "only\n").unwrap();

    let watcher = ChannelWatcher::new();
    let tailer = FileTailer::new(&path, Arc::new(watcher.clone()), no_polling());
    let mut lines = tailer.subscribe();
    assert_eq!(next_line(&mut lines).await, Line::new(1, "only"));

    watcher.notify_changed(&path);
    watcher.notify_changed(&path);
    assert_quiet(&mut lines).await;
}

#[tokio::test]
async fn follow_emits_context_for_backlog_and_appends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(
        &path,
        "2024-01-02 03:04:05 start\nnot-a-date ERROR one\n2024-01-02 03:04:06 after\n",
    )
    .unwrap();

    let watcher = ChannelWatcher::new();
    let tailer = FileTailer::new(&path, Arc::new(watcher.clone()), no_polling());
    let extractor = ContextExtractor::new(1, 1).with_pattern(Regex::new("ERROR").unwrap());
    let mut bundles = Box::pin(extractor.follow(&tailer));

    let first = tokio::time::timeout(WAIT, bundles.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first.line(), &Line::new(2, "not-a-date ERROR one"));

    let sniffer = TimestampSniffer::with_default_offset(FixedOffset::east_opt(0).unwrap());
    let ts = sniffer.sniff(&first).unwrap();
    assert_eq!(ts.to_rfc3339(), "2024-01-02T03:04:05+00:00");

    append(&path, "ERROR two\nfine\n");
    watcher.notify_changed(&path);

    let second = tokio::time::timeout(WAIT, bundles.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second.preceding_lines(), &[Line::new(3, "2024-01-02 03:04:06 after")]);
    assert_eq!(second.line(), &Line::new(4, "ERROR two"));
    assert_eq!(second.following_lines(), &[Line::new(5, "fine")]);
}

#[tokio::test]
async fn unsubscribing_stops_watching() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "a\n").unwrap();

    let watcher = ChannelWatcher::new();
    let tailer = FileTailer::new(&path, Arc::new(watcher.clone()), no_polling());
    let extractor = ContextExtractor::new(0, 0);
    let mut bundles = Box::pin(extractor.follow(&tailer));

    let first = tokio::time::timeout(WAIT, bundles.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first.line(), &Line::new(1, "a"));
    assert_eq!(watcher.subscriber_count(&path), 1);

    drop(bundles);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(watcher.subscriber_count(&path), 0);
    assert!(!tailer.is_active());
}
