//! Streaming `grep -C` over numbered lines.

use std::future;
use std::path::Path;

use futures_core::Stream;
use futures_util::StreamExt;
use regex::Regex;

use super::bundle::ContextBundle;
use crate::tail::{read_lines, FileTailer, Line, TailError};
use crate::window::{try_sliding_window, SlidingWindowExt};

/// Builds [`ContextBundle`]s from a line sequence.
///
/// Every full window of `preceding + 1 + following` lines is a candidate; the
/// line at offset `preceding` is its focus. A candidate is kept when the focus
/// line has content and, if a pattern is set, the pattern matches somewhere in
/// the focus line.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    preceding: usize,
    following: usize,
    pattern: Option<Regex>,
}

impl ContextExtractor {
    /// Create an extractor keeping every line.
    ///
    /// # Panics
    ///
    /// Panics if `preceding + 1 + following` overflows `usize`; use
    /// [`checked`](Self::checked) for untrusted sizes.
    #[must_use]
    pub fn new(preceding: usize, following: usize) -> Self {
        Self::checked(preceding, following).unwrap_or_else(|| {
            panic!("context window of {preceding} + 1 + {following} lines overflows usize")
        })
    }

    /// Create an extractor, or `None` if the window size overflows `usize`.
    #[must_use]
    pub fn checked(preceding: usize, following: usize) -> Option<Self> {
        preceding.checked_add(following)?.checked_add(1)?;
        Some(Self {
            preceding,
            following,
            pattern: None,
        })
    }

    /// Only keep focus lines matching `pattern`.
    #[must_use]
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Number of preceding context lines.
    #[must_use]
    pub fn preceding(&self) -> usize {
        self.preceding
    }

    /// Number of following context lines.
    #[must_use]
    pub fn following(&self) -> usize {
        self.following
    }

    /// The focus-line filter, if any.
    #[must_use]
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Lines per window.
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.preceding + 1 + self.following
    }

    /// Returns `true` if `line` qualifies as a focus line.
    #[must_use]
    pub fn is_focus(&self, line: &Line) -> bool {
        line.content()
            .is_some_and(|content| self.pattern.as_ref().is_none_or(|re| re.is_match(content)))
    }

    /// Turn one full window into a bundle, or drop it.
    #[must_use]
    pub fn bundle(&self, window: Vec<Line>) -> Option<ContextBundle> {
        if !self.is_focus(window.get(self.preceding)?) {
            return None;
        }
        ContextBundle::from_window(window, self.preceding)
    }

    /// Extract bundles from a finite line sequence.
    pub fn extract<'a, I>(&'a self, lines: I) -> impl Iterator<Item = ContextBundle> + 'a
    where
        I: IntoIterator<Item = Line>,
        I::IntoIter: 'a,
    {
        self.trace_start("finite");
        lines
            .into_iter()
            .sliding_window(self.window_size())
            .filter_map(|window| self.bundle(window))
    }

    /// Read `path` to its end and extract bundles from it.
    ///
    /// # Errors
    ///
    /// Returns an access error if the file cannot be opened, or an I/O error
    /// from reading it.
    pub fn read_file(&self, path: &Path) -> Result<Vec<ContextBundle>, TailError> {
        let lines = read_lines(path)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TailError::from_io(path, e))?;
        tracing::debug!(path = %path.display(), lines = lines.len(), "Read file for context");
        Ok(self.extract(lines).collect())
    }

    /// Extract bundles from a push stream of lines.
    ///
    /// The first error ends the stream. Must be polled inside a tokio
    /// runtime.
    pub fn extract_stream<S, E>(
        &self,
        source: S,
    ) -> impl Stream<Item = Result<ContextBundle, E>> + Send + 'static
    where
        S: Stream<Item = Result<Line, E>> + Send + 'static,
        E: Clone + Send + 'static,
    {
        self.trace_start("stream");
        let extractor = self.clone();
        try_sliding_window(source, self.window_size()).filter_map(move |window| {
            future::ready(match window {
                Ok(window) => extractor.bundle(window).map(Ok),
                Err(e) => Some(Err(e)),
            })
        })
    }

    /// Follow a tailed file, backlog first, then appended lines.
    pub fn follow(
        &self,
        tailer: &FileTailer,
    ) -> impl Stream<Item = Result<ContextBundle, TailError>> + Send + 'static {
        self.extract_stream(tailer.subscribe())
    }

    fn trace_start(&self, source: &str) {
        tracing::trace!(
            source,
            pattern = self.pattern.as_ref().map(Regex::as_str),
            preceding = self.preceding,
            following = self.following,
            "Creating context lines"
        );
    }
}
