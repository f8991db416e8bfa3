//! Per-folder bookkeeping kept by an isolation backend.

use serde::Serialize;
use std::path::PathBuf;

use super::catalog::UserFolder;

/// Lifecycle state of a [`MountRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    /// Private directories exist, the OS redirection does not.
    Prepared,
    /// The OS redirection was confirmed ("mounted" / "linked").
    Active,
    /// The redirection was removed; the record is about to be dropped.
    Released,
}

/// Paths that make up one redirected folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordLayout {
    /// Union mount triad plus the convenience link.
    Overlay {
        /// Read-only lower layer (the original folder).
        lower: PathBuf,
        /// Writable upper layer.
        upper: PathBuf,
        /// Overlay work directory.
        work: PathBuf,
        /// Mount point exposing the merged view.
        merged: PathBuf,
        /// Convenience link pointing at `merged`.
        link: PathBuf,
        /// `true` when the lower folder did not exist and was created for the session.
        created_lower: bool,
    },
    /// Junction replacing the original folder.
    Junction {
        /// Original folder location; becomes the junction.
        original: PathBuf,
        /// Where the original folder was moved aside.
        backup: PathBuf,
        /// Private folder the junction points at.
        sandbox: PathBuf,
    },
}

/// Tracks one redirected folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountRecord {
    folder: UserFolder,
    state: MountState,
    layout: RecordLayout,
}

impl MountRecord {
    pub(crate) fn prepared(folder: UserFolder, layout: RecordLayout) -> Self {
        Self {
            folder,
            state: MountState::Prepared,
            layout,
        }
    }

    /// The folder this record belongs to.
    #[must_use]
    pub fn folder(&self) -> UserFolder {
        self.folder
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Paths backing the redirection.
    #[must_use]
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Returns `true` if the OS redirection is in place.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == MountState::Active
    }

    pub(crate) fn mark_active(&mut self) {
        self.state = MountState::Active;
    }

    pub(crate) fn mark_released(&mut self) {
        self.state = MountState::Released;
    }
}
