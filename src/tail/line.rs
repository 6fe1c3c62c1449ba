//! Numbered lines and the forward-only line cursor.
//!
//! A [`LineCursor`] wraps a buffered reader and hands out [`Line`] values
//! numbered from 1. Only complete lines (terminated by `\n`) are returned
//! while tailing; a trailing fragment stays buffered until the writer
//! finishes it.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use super::error::TailError;

/// A single numbered line of a text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    /// 1-based line number within one cursor's lifetime.
    line_number: u64,
    /// Line text without its terminator, or `None` when no content is
    /// available.
    content: Option<String>,
}

impl Line {
    /// Create a line with content.
    #[must_use]
    pub fn new(line_number: u64, content: impl Into<String>) -> Self {
        Self {
            line_number,
            content: Some(content.into()),
        }
    }

    /// Create a placeholder line carrying no content.
    #[must_use]
    pub fn empty(line_number: u64) -> Self {
        Self {
            line_number,
            content: None,
        }
    }

    /// Get the line number.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Get the line content, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.line_number,
            self.content.as_deref().unwrap_or_default()
        )
    }
}

/// Forward-only reader producing numbered lines.
///
/// The line counter lives as long as the cursor; recreating the cursor is the
/// only way to start over from line 1.
#[derive(Debug)]
pub struct LineCursor<R> {
    reader: R,
    line_number: u64,
    partial: Vec<u8>,
}

impl LineCursor<BufReader<File>> {
    /// Open `path` for shared reading, positioned at the start of the file.
    ///
    /// The file may be held open for appending, renamed or deleted by another
    /// process while this cursor reads it.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::NotFound`] or [`TailError::PermissionDenied`] for
    /// access failures, [`TailError::Io`] for anything else.
    pub fn open(path: &Path) -> Result<Self, TailError> {
        let file = open_shared(path).map_err(|e| TailError::from_io(path, e))?;
        tracing::debug!(path = %path.display(), "Opened read cursor");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineCursor<R> {
    /// Wrap an already-open reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            partial: Vec::new(),
        }
    }

    /// Number of the last line handed out (0 before the first line).
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Returns `true` if an unterminated fragment is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Read the next complete line, or `None` if none is available yet.
    ///
    /// An incomplete trailing line is kept and completed by a later call.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the underlying reader.
    pub fn read_next_complete_line(&mut self) -> io::Result<Option<Line>> {
        self.reader.read_until(b'\n', &mut self.partial)?;
        if self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }

        let mut bytes = std::mem::take(&mut self.partial);
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Ok(Some(self.next_line(&bytes)))
    }

    /// Read every complete line currently available.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the underlying reader. Lines read before
    /// the error are lost, but the counter still reflects them.
    pub fn drain(&mut self) -> io::Result<Vec<Line>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_next_complete_line()? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Hand out the buffered unterminated fragment as a final line.
    ///
    /// Only meaningful once the source is known to be complete.
    pub fn finish(&mut self) -> Option<Line> {
        if self.partial.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.partial);
        Some(self.next_line(&bytes))
    }

    /// Consume the cursor as an iterator over the whole remaining input,
    /// including an unterminated last line.
    pub fn into_lines(self) -> FileLines<R> {
        FileLines {
            cursor: self,
            done: false,
        }
    }

    fn next_line(&mut self, bytes: &[u8]) -> Line {
        self.line_number += 1;
        Line::new(self.line_number, String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Iterator over every line of a completed read.
///
/// Stops after the first error.
#[derive(Debug)]
pub struct FileLines<R> {
    cursor: LineCursor<R>,
    done: bool,
}

impl<R: BufRead> Iterator for FileLines<R> {
    type Item = io::Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.read_next_complete_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                self.cursor.finish().map(Ok)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every line of `path` from the start, as a finite sequence.
///
/// # Errors
///
/// Returns an access error if the file cannot be opened.
pub fn read_lines(path: &Path) -> Result<FileLines<BufReader<File>>, TailError> {
    Ok(LineCursor::open(path)?.into_lines())
}

#[cfg(windows)]
fn open_shared(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_SHARE_READ: u32 = 0x0000_0001;
    const FILE_SHARE_WRITE: u32 = 0x0000_0002;
    const FILE_SHARE_DELETE: u32 = 0x0000_0004;

    std::fs::OpenOptions::new()
        .read(true)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
        .open(path)
}

#[cfg(not(windows))]
fn open_shared(path: &Path) -> io::Result<File> {
    File::open(path)
}
