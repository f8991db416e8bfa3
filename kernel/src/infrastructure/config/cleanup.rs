//! Teardown settings.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::cleanup::purge::DEFAULT_WINDOW;

/// Cleanup settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CleanupSettings {
    /// Only files modified within this many minutes are purged.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
    /// Temp locations to purge. Defaults to the system temp and cache dirs.
    #[serde(default)]
    pub temp_locations: Vec<PathBuf>,
    /// Recently-used list. Defaults to the platform's list.
    #[serde(default)]
    pub recent_list: Option<PathBuf>,
    /// Scrub browser history artifacts.
    #[serde(default = "default_true")]
    pub scrub_browsers: bool,
}

impl CleanupSettings {
    /// Purge window.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes.saturating_mul(60))
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            temp_locations: Vec::new(),
            recent_list: None,
            scrub_browsers: true,
        }
    }
}

fn default_window_minutes() -> u64 {
    DEFAULT_WINDOW.as_secs() / 60
}

fn default_true() -> bool {
    true
}
