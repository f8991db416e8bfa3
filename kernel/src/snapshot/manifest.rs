//! On-disk layout of a snapshot: artifacts plus `manifest.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::SnapshotError;
use crate::isolation::BackendKind;

const MANIFEST: &str = "manifest.json";

/// One captured location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// File path or registry key that was captured.
    pub source: String,
    /// Artifact file name inside the snapshot directory; `None` when the
    /// source did not exist at capture time.
    pub artifact: Option<String>,
    /// Hex SHA-256 of the artifact.
    pub sha256: Option<String>,
}

impl SnapshotEntry {
    /// Entry for a source that existed and was saved to `artifact`.
    #[must_use]
    pub fn saved(source: impl Into<String>, artifact: impl Into<String>, sha256: String) -> Self {
        Self {
            source: source.into(),
            artifact: Some(artifact.into()),
            sha256: Some(sha256),
        }
    }

    /// Entry for a source that did not exist.
    #[must_use]
    pub fn absent(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            artifact: None,
            sha256: None,
        }
    }
}

/// A complete configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    /// Backend the snapshot belongs to.
    pub backend: BackendKind,
    /// Captured locations, in capture order.
    pub entries: Vec<SnapshotEntry>,
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The snapshot directory below the working root.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.root
    }

    pub(crate) fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Removes any stale snapshot and creates an empty directory.
    pub(crate) fn begin(&self) -> Result<(), SnapshotError> {
        self.discard()?;
        std::fs::create_dir_all(&self.root).map_err(|e| SnapshotError::io(&self.root, e))
    }

    /// Writes an artifact and returns its digest.
    pub(crate) fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<String, SnapshotError> {
        let path = self.artifact(name);
        std::fs::write(&path, bytes).map_err(|e| SnapshotError::io(&path, e))?;
        Ok(digest(bytes))
    }

    /// Digest of an artifact already on disk.
    pub(crate) fn digest_of(&self, name: &str) -> Result<String, SnapshotError> {
        let path = self.artifact(name);
        let bytes = std::fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        Ok(digest(&bytes))
    }

    /// Reads an artifact and checks it against the manifest digest.
    pub(crate) fn read_verified(&self, entry: &SnapshotEntry) -> Result<Option<Vec<u8>>, SnapshotError> {
        let Some(name) = entry.artifact.as_deref() else {
            return Ok(None);
        };
        let path = self.artifact(name);
        let bytes = std::fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        let actual = digest(&bytes);
        if let Some(expected) = entry.sha256.as_deref()
            && expected != actual
        {
            return Err(SnapshotError::Corrupt {
                artifact: path,
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(Some(bytes))
    }

    /// Writes the manifest, completing the snapshot.
    pub(crate) fn commit(&self, snapshot: &ConfigSnapshot) -> Result<(), SnapshotError> {
        let path = self.root.join(MANIFEST);
        let json = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&path, json).map_err(|e| SnapshotError::io(&path, e))?;
        debug!(entries = snapshot.entries.len(), "Snapshot manifest written");
        Ok(())
    }

    /// Loads the manifest of a complete snapshot.
    pub(crate) fn load(&self) -> Result<Option<ConfigSnapshot>, SnapshotError> {
        let path = self.root.join(MANIFEST);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::io(path, e)),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.root.join(MANIFEST).is_file()
    }

    /// Deletes the snapshot directory.
    pub(crate) fn discard(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(SnapshotError::io(&self.root, e))
            }
            _ => Ok(()),
        }
    }
}
