//! Configuration snapshot taken before a session and reverted after it.
//!
//! A snapshot is a directory below the working root holding one artifact per
//! captured location plus `manifest.json`. The manifest is written last, so
//! its presence marks a complete snapshot that still needs restoring.

pub mod files;
pub mod manifest;
pub mod registry;

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::isolation::PrivilegedError;

pub use files::FileSnapshot;
pub use manifest::{ConfigSnapshot, SnapshotEntry};
pub use registry::RegistrySnapshot;

/// Directory name of the snapshot below the working root.
pub const SNAPSHOT_DIR: &str = "snapshot";

/// Result of [`SnapshotStore::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// This many locations were written back.
    Restored(usize),
    /// No complete snapshot existed.
    NothingToRestore,
}

/// Errors raised while capturing or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Reading or writing a file failed.
    #[error("Snapshot I/O failed at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The manifest could not be encoded or decoded.
    #[error("Snapshot manifest is unreadable: {0}")]
    Manifest(#[from] serde_json::Error),
    /// An artifact does not match the digest recorded at capture.
    #[error("Snapshot artifact {artifact} is corrupt (expected {expected}, found {actual})")]
    Corrupt {
        /// Artifact file.
        artifact: PathBuf,
        /// Digest recorded in the manifest.
        expected: String,
        /// Digest of the file on disk.
        actual: String,
    },
    /// Exporting or importing a registry key failed.
    #[error("Registry operation for {key} failed: {source}")]
    Registry {
        /// Registry key.
        key: String,
        /// Source error.
        #[source]
        source: PrivilegedError,
    },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Captures and reverts a backend-defined set of configuration locations.
pub trait SnapshotStore: Send + Sync + fmt::Debug {
    /// Serializes the current values, replacing any stale snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a location cannot be read or the artifact cannot
    /// be written. No manifest is left behind in that case.
    fn capture(&self) -> Result<ConfigSnapshot, SnapshotError>;

    /// Writes a complete snapshot back and deletes it. A missing snapshot
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an artifact is corrupt or cannot be applied; the
    /// snapshot is kept for a later attempt.
    fn restore(&self) -> Result<RestoreOutcome, SnapshotError>;

    /// Returns `true` if a complete snapshot is waiting to be restored.
    fn pending(&self) -> bool;
}
