//! Focus line plus its neighbouring lines.

use std::fmt;

use serde::Serialize;

use crate::tail::Line;

/// A focus line with the lines immediately before and after it.
///
/// Line numbers are contiguous across preceding lines, the focus line and
/// following lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextBundle {
    preceding_lines: Vec<Line>,
    line: Line,
    following_lines: Vec<Line>,
}

impl ContextBundle {
    /// Split a window into a bundle centred on `window[focus]`.
    ///
    /// Returns `None` if `focus` is outside the window.
    #[must_use]
    pub fn from_window(mut window: Vec<Line>, focus: usize) -> Option<Self> {
        if focus >= window.len() {
            return None;
        }
        let following_lines = window.split_off(focus + 1);
        let line = window.pop()?;
        Some(Self {
            preceding_lines: window,
            line,
            following_lines,
        })
    }

    /// Lines before the focus line, oldest first.
    #[must_use]
    pub fn preceding_lines(&self) -> &[Line] {
        &self.preceding_lines
    }

    /// The focus line.
    #[must_use]
    pub fn line(&self) -> &Line {
        &self.line
    }

    /// Lines after the focus line, oldest first.
    #[must_use]
    pub fn following_lines(&self) -> &[Line] {
        &self.following_lines
    }

    /// Every line of the bundle in file order.
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.preceding_lines
            .iter()
            .chain(std::iter::once(&self.line))
            .chain(&self.following_lines)
    }
}

impl fmt::Display for ContextBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.preceding_lines {
            writeln!(f, "{line}")?;
        }
        writeln!(f, "===== {}", self.line)?;
        for line in &self.following_lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
