//! Colored CLI display utilities for tailed output.
//!
//! Plain text mirrors the `Display` impls of [`Line`] and [`ContextBundle`];
//! the focus line of a bundle is highlighted. JSON output writes one object
//! per line.

use std::io::{self, Write};

use chrono::{DateTime, FixedOffset};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::context::ContextBundle;
use crate::tail::Line;

/// Output format for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human readable, colored when `color` is set.
    Text { color: bool },
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct BundleRecord<'a> {
    #[serde(flatten)]
    bundle: &'a ContextBundle,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<FixedOffset>>,
}

/// Render a numbered line.
#[must_use]
pub fn format_line(line: &Line, color: bool) -> String {
    let content = line.content().unwrap_or_default();
    if color {
        format!("{} {content}", format!("{:>6}", line.line_number()).dimmed())
    } else {
        format!("{:>6} {content}", line.line_number())
    }
}

/// Render a bundle: context lines, the highlighted focus line and a
/// separator.
#[must_use]
pub fn format_bundle(
    bundle: &ContextBundle,
    timestamp: Option<DateTime<FixedOffset>>,
    color: bool,
) -> String {
    let mut out = String::new();
    if let Some(ts) = timestamp {
        let stamp = format!("[{}]", ts.to_rfc3339());
        if color {
            out.push_str(&stamp.cyan().to_string());
        } else {
            out.push_str(&stamp);
        }
        out.push('\n');
    }
    for line in bundle.preceding_lines() {
        out.push_str(&format_line(line, color));
        out.push('\n');
    }
    let focus = bundle.line();
    let marker = format!(
        "{:>6} {}",
        focus.line_number(),
        focus.content().unwrap_or_default()
    );
    if color {
        out.push_str(&marker.yellow().bold().to_string());
    } else {
        out.push_str(&marker);
    }
    out.push('\n');
    for line in bundle.following_lines() {
        out.push_str(&format_line(line, color));
        out.push('\n');
    }
    out.push_str("--");
    out
}

/// Print a single tailed line.
///
/// # Errors
///
/// Returns an error if stdout cannot be written or the line cannot be
/// serialized.
pub fn print_line(line: &Line, mode: OutputMode) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match mode {
        OutputMode::Text { color } => writeln!(stdout, "{}", format_line(line, color))?,
        OutputMode::Json => {
            serde_json::to_writer(&mut stdout, line)?;
            writeln!(stdout)?;
        }
    }
    stdout.flush()
}

/// Print a context bundle with its optional timestamp.
///
/// # Errors
///
/// Returns an error if stdout cannot be written or the bundle cannot be
/// serialized.
pub fn print_bundle(
    bundle: &ContextBundle,
    timestamp: Option<DateTime<FixedOffset>>,
    mode: OutputMode,
) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match mode {
        OutputMode::Text { color } => {
            writeln!(stdout, "{}", format_bundle(bundle, timestamp, color))?;
        }
        OutputMode::Json => {
            serde_json::to_writer(&mut stdout, &BundleRecord { bundle, timestamp })?;
            writeln!(stdout)?;
        }
    }
    stdout.flush()
}
