//! One tailing session over one file.
//!
//! A [`TailSession`] owns the read cursor and its line counter. The backlog
//! is read through a borrow of the session and the live stream consumes it,
//! so the live drain cannot start until the backlog is finished with. Any
//! backlog lines left unread are delivered first by the live stream.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::error::TailError;
use super::line::{Line, LineCursor};
use super::watcher::{ChangeSubscription, ChangeWatcher};

/// Default period of the polling fallback.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Runtime options for a tailing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    /// Period of the timer that re-drains the file when no change
    /// notification arrives. Zero disables the timer.
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Exclusive tailing state for one file.
#[derive(Debug)]
pub struct TailSession {
    path: PathBuf,
    cursor: LineCursor<BufReader<File>>,
    changes: ChangeSubscription,
    options: TailOptions,
}

impl TailSession {
    /// Open `path` from its start and subscribe to its changes.
    ///
    /// # Errors
    ///
    /// Returns an access error if the file cannot be opened, or the
    /// watcher's error if the subscription fails.
    pub fn open(
        path: &Path,
        watcher: &dyn ChangeWatcher,
        options: TailOptions,
    ) -> Result<Self, TailError> {
        let cursor = LineCursor::open(path)?;
        let changes = watcher.subscribe(path)?;
        tracing::debug!(
            path = %path.display(),
            poll_interval_ms = options.poll_interval.as_millis(),
            "Opened tail session"
        );
        Ok(Self {
            path: path.to_path_buf(),
            cursor,
            changes,
            options,
        })
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of the last line read so far.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.cursor.line_number()
    }

    /// Lines already present in the file, read until no complete line is
    /// left.
    pub fn backlog(&mut self) -> Backlog<'_> {
        Backlog {
            path: &self.path,
            cursor: &mut self.cursor,
            done: false,
        }
    }

    /// Turn the session into the stream of lines appended from now on.
    ///
    /// The stream drains once immediately, then again on every change
    /// notification and timer tick. Dropping it closes the cursor and
    /// unsubscribes from the watcher.
    #[must_use]
    pub fn into_live(self) -> LiveLines {
        let state = LiveState {
            path: self.path,
            cursor: Some(self.cursor),
            changes: self.changes,
            poll_interval: self.options.poll_interval,
            ticker: None,
            pending: VecDeque::new(),
            primed: false,
            failed: false,
        };
        LiveLines {
            inner: stream::unfold(state, LiveState::step).boxed(),
        }
    }
}

/// Iterator over the backlog of a [`TailSession`].
#[derive(Debug)]
pub struct Backlog<'a> {
    path: &'a Path,
    cursor: &'a mut LineCursor<BufReader<File>>,
    done: bool,
}

impl Iterator for Backlog<'_> {
    type Item = Result<Line, TailError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.read_next_complete_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                tracing::debug!(
                    path = %self.path.display(),
                    lines = self.cursor.line_number(),
                    "Backlog drained"
                );
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(TailError::from_io(self.path, e)))
            }
        }
    }
}

/// Lines appended to a tailed file, as they become available.
///
/// Read errors are reported and polling continues; watcher failures end the
/// stream.
pub struct LiveLines {
    inner: BoxStream<'static, Result<Line, TailError>>,
}

impl Stream for LiveLines {
    type Item = Result<Line, TailError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for LiveLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveLines").finish_non_exhaustive()
    }
}

struct LiveState {
    path: PathBuf,
    cursor: Option<LineCursor<BufReader<File>>>,
    changes: ChangeSubscription,
    poll_interval: Duration,
    ticker: Option<Interval>,
    pending: VecDeque<Line>,
    primed: bool,
    failed: bool,
}

impl LiveState {
    async fn step(mut self) -> Option<(Result<Line, TailError>, Self)> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(line) = self.pending.pop_front() {
                return Some((Ok(line), self));
            }
            if self.primed {
                if let Err(e) = self.wait_for_trigger().await {
                    tracing::debug!(path = %self.path.display(), error = %e, "Tail session failed");
                    self.failed = true;
                    return Some((Err(e), self));
                }
            }
            self.primed = true;

            match self.drain().await {
                Ok(lines) => self.pending.extend(lines),
                Err(e) => {
                    // Without a cursor there is nothing left to poll.
                    self.failed = self.cursor.is_none();
                    return Some((Err(e), self));
                }
            }
        }
    }

    async fn wait_for_trigger(&mut self) -> Result<(), TailError> {
        if self.ticker.is_none() && !self.poll_interval.is_zero() {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
        }

        let ticker = &mut self.ticker;
        let changes = &mut self.changes;
        let tick = async {
            match ticker {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            change = changes.recv() => match change {
                Some(Ok(_)) => {
                    tracing::trace!(path = %self.path.display(), "Change notification");
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Err(TailError::WatcherClosed(self.path.clone())),
            },
            () = tick => {
                tracing::trace!(path = %self.path.display(), "Poll tick");
                Ok(())
            }
        }
    }

    async fn drain(&mut self) -> Result<Vec<Line>, TailError> {
        let Some(mut cursor) = self.cursor.take() else {
            return Ok(Vec::new());
        };
        let (cursor, result) = tokio::task::spawn_blocking(move || {
            let result = cursor.drain();
            (cursor, result)
        })
        .await?;
        self.cursor = Some(cursor);

        let lines = result.map_err(|e| TailError::from_io(&self.path, e))?;
        if let Some(last) = lines.last() {
            tracing::debug!(
                path = %self.path.display(),
                count = lines.len(),
                last_line = last.line_number(),
                "Drained new lines"
            );
        }
        Ok(lines)
    }
}
