//! Live tailing of appended-to text files.
//!
//! A file is read from its start through a [`LineCursor`]; lines already in
//! the file form the backlog, and a [`ChangeWatcher`] plus a polling timer
//! trigger further drains for appended lines.

mod error;
mod line;
mod session;
mod tailer;
mod watcher;

pub use error::TailError;
pub use line::{read_lines, FileLines, Line, LineCursor};
pub use session::{Backlog, LiveLines, TailOptions, TailSession, DEFAULT_POLL_INTERVAL};
pub use tailer::{session_lines, FileTailer, LineResult};
pub use watcher::{
    ChangeResult, ChangeSubscription, ChangeWatcher, ChannelWatcher, FileChange, NotifyWatcher,
};
