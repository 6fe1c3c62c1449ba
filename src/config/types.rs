//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tail::TailOptions;

/// Tailing configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Seconds between fallback polls of a tailed file. 0 disables polling.
    pub poll_interval_secs: u64,
    /// Debounce window for change notifications in milliseconds. 0 delivers
    /// raw notifications.
    pub debounce_ms: u64,
    /// Default number of lines shown before a focus line.
    pub preceding: usize,
    /// Default number of lines shown after a focus line.
    pub following: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            debounce_ms: 100,
            preceding: 2,
            following: 2,
        }
    }
}

impl TailConfig {
    /// Session options derived from this configuration.
    #[must_use]
    pub fn tail_options(&self) -> TailOptions {
        TailOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }

    /// Debounce window, or `None` for raw notifications.
    #[must_use]
    pub fn debounce(&self) -> Option<Duration> {
        (self.debounce_ms > 0).then(|| Duration::from_millis(self.debounce_ms))
    }
}
