//! Where the session lives and how it is redirected.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::isolation::{BackendKind, Escalation, UserFolder};
use crate::tracker::DEFAULT_POLL_INTERVAL;

/// Workspace settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkspaceSettings {
    /// Private working root. Defaults to `<data dir>/ephemera`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Home holding the original folders. Defaults to the user's home.
    #[serde(default)]
    pub home: Option<PathBuf>,
    /// Folders to isolate; empty means the whole catalog.
    #[serde(default)]
    pub folders: Vec<UserFolder>,
    /// Redirection variant. Defaults to the host's variant.
    #[serde(default)]
    pub backend: Option<BackendKind>,
    /// How privileged commands are elevated. Defaults to the host's method.
    #[serde(default)]
    pub escalation: Option<Escalation>,
    /// Change tracker period in milliseconds.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Files captured by the file snapshot. Defaults to the desktop's
    /// user-dirs and bookmark files.
    #[serde(default)]
    pub snapshot_files: Vec<PathBuf>,
    /// Keys captured by the registry snapshot. Defaults to the Explorer
    /// recent-activity keys (`UserAssist`, `RecentDocs`, `RunMRU`,
    /// `TypedPaths`).
    #[serde(default)]
    pub registry_keys: Vec<String>,
}

impl WorkspaceSettings {
    /// Tracker period, falling back to the default.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis)
    }
}
