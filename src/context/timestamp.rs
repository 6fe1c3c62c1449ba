//! Best-effort timestamp recovery from free-text log lines.
//!
//! Candidates are the focus line, then the preceding lines, then the
//! following lines. For each, the first two space-separated tokens are joined,
//! commas become periods (`03:04:05,123` style fractions), and the result is
//! parsed as a date and time. The first candidate that parses wins.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};

use super::bundle::ContextBundle;

/// Formats carrying their own UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y/%m/%d %H:%M:%S%.f%:z",
    "%Y/%m/%d %H:%M:%S%.f%z",
];

/// Formats without an offset; the sniffer's default offset applies.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d-%b-%Y %H:%M:%S%.f",
];

/// Recovers the timestamp of a [`ContextBundle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampSniffer {
    default_offset: Option<FixedOffset>,
}

impl TimestampSniffer {
    /// Create a sniffer that reads offset-less timestamps as local time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read offset-less timestamps with `offset` instead of local time.
    #[must_use]
    pub fn with_default_offset(offset: FixedOffset) -> Self {
        Self {
            default_offset: Some(offset),
        }
    }

    /// Find the first parseable timestamp in the bundle, in scan order.
    #[must_use]
    pub fn sniff(&self, bundle: &ContextBundle) -> Option<DateTime<FixedOffset>> {
        let found = std::iter::once(bundle.line())
            .chain(bundle.preceding_lines())
            .chain(bundle.following_lines())
            .filter_map(|line| line.content())
            .find_map(|content| self.parse_line(content));
        if found.is_none() {
            tracing::trace!(
                line = bundle.line().line_number(),
                "No timestamp found in context"
            );
        }
        found
    }

    /// Parse the leading two tokens of `content` as a timestamp.
    #[must_use]
    pub fn parse_line(&self, content: &str) -> Option<DateTime<FixedOffset>> {
        let mut tokens = content.split(' ');
        let (Some(date), Some(time)) = (tokens.next(), tokens.next()) else {
            return None;
        };
        self.parse(&format!("{date} {time}").replace(',', "."))
    }

    fn parse(&self, text: &str) -> Option<DateTime<FixedOffset>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&text.replacen(' ', "T", 1)) {
            return Some(parsed);
        }
        if let Some(parsed) = OFFSET_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(text, format).ok())
        {
            return Some(parsed);
        }
        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())?;
        self.localize(&naive)
    }

    fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self.default_offset {
            Some(offset) => offset.from_local_datetime(naive).single(),
            None => {
                let local = Local.from_local_datetime(naive).earliest()?;
                Some(local.with_timezone(local.offset()))
            }
        }
    }
}
