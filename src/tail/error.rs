//! Tailing error types.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Errors that can occur while opening, reading or watching a tailed file.
///
/// Tailed lines are fanned out to every subscriber of a shared stream, so the
/// error is `Clone`; non-clonable sources are held behind an `Arc`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum TailError {
    /// File does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// I/O error while reading.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Watch(#[source] Arc<notify::Error>),

    /// The change notification source went away.
    #[error("Change watcher closed for {}", .0.display())]
    WatcherClosed(PathBuf),

    /// A blocking read task panicked or was cancelled.
    #[error("Read task failed: {0}")]
    Task(String),
}

impl TailError {
    /// Classify an I/O error raised while working with `path`.
    ///
    /// Access errors get dedicated variants so callers can decide whether a
    /// retry makes sense.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(err),
            },
        }
    }

    /// Returns `true` for errors raised when the file could not be accessed.
    #[must_use]
    pub fn is_access_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::PermissionDenied(_))
    }
}

impl From<notify::Error> for TailError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for TailError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
