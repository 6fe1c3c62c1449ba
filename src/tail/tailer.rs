//! Shared tailing handle for one file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_core::Stream;
use futures_util::stream::{self, StreamExt};

use super::error::TailError;
use super::line::Line;
use super::session::{TailOptions, TailSession};
use super::watcher::ChangeWatcher;
use crate::window::{SharedStream, Subscription};

/// Item type of a tailed line stream.
pub type LineResult = Result<Line, TailError>;

/// Tails one file for any number of consumers.
///
/// The subscription that opens a session sees the file's backlog followed by
/// its live appends, as do all subscriptions created before it is first
/// polled. They share a single [`TailSession`]. A subscription joining a
/// running session only gets lines read from that point on. The session is
/// closed when the last subscriber unsubscribes, and the next subscription
/// opens a new one counting from line 1 again.
#[derive(Debug, Clone)]
pub struct FileTailer {
    path: PathBuf,
    lines: SharedStream<LineResult>,
}

impl FileTailer {
    /// Create a tailer for `path`. Nothing is opened until a subscription is
    /// first polled.
    pub fn new(
        path: impl Into<PathBuf>,
        watcher: Arc<dyn ChangeWatcher>,
        options: TailOptions,
    ) -> Self {
        let path = path.into();
        let session_path = path.clone();
        let lines = SharedStream::new(move || {
            session_lines(session_path.clone(), Arc::clone(&watcher), options.clone())
        });
        Self { path, lines }
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to the file's lines.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<LineResult> {
        self.lines.subscribe()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lines.subscriber_count()
    }

    /// Returns `true` while a session is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lines.is_connected()
    }
}

/// Open a session on `path` and stream its backlog, then its live lines.
///
/// Opening and the backlog read run on the blocking pool. An open failure is
/// delivered as the only item.
pub fn session_lines(
    path: PathBuf,
    watcher: Arc<dyn ChangeWatcher>,
    options: TailOptions,
) -> impl Stream<Item = LineResult> + Send + 'static {
    stream::once(open_with_backlog(path, watcher, options)).flat_map(|opened| match opened {
        Ok((backlog, session)) => stream::iter(backlog.into_iter().map(Ok))
            .chain(session.into_live())
            .left_stream(),
        Err(e) => stream::iter([Err(e)]).right_stream(),
    })
}

async fn open_with_backlog(
    path: PathBuf,
    watcher: Arc<dyn ChangeWatcher>,
    options: TailOptions,
) -> Result<(Vec<Line>, TailSession), TailError> {
    tokio::task::spawn_blocking(move || {
        let mut session = TailSession::open(&path, watcher.as_ref(), options)?;
        let backlog = session.backlog().collect::<Result<Vec<_>, _>>()?;
        Ok::<_, TailError>((backlog, session))
    })
    .await?
}
