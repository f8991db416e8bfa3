//! Registry snapshot used on junction hosts.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::manifest::{ConfigSnapshot, SnapshotDir, SnapshotEntry};
use super::{RestoreOutcome, SNAPSHOT_DIR, SnapshotError, SnapshotStore};
use crate::isolation::{BackendKind, PrivilegedCommand, PrivilegedError, PrivilegedExecutor};

/// Explorer keys that record recently opened and typed locations.
pub const DEFAULT_KEYS: [&str; 4] = [
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\UserAssist",
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\RecentDocs",
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\RunMRU",
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\TypedPaths",
];

/// Exports registry keys to `.reg` files and imports them back.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    dir: SnapshotDir,
    keys: Vec<String>,
    executor: Arc<dyn PrivilegedExecutor>,
}

impl RegistrySnapshot {
    /// Snapshot of `keys`, stored below `working_root`.
    #[must_use]
    pub fn new(working_root: &Path, keys: Vec<String>, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            dir: SnapshotDir::new(working_root.join(SNAPSHOT_DIR)),
            keys,
            executor,
        }
    }

    /// Deletes `key` so an import recreates it exactly, or so a key that did
    /// not exist at capture time is gone again.
    fn delete_key(&self, key: &str) -> Result<(), SnapshotError> {
        let delete = PrivilegedCommand::DeleteRegistry {
            key: key.to_string(),
        };
        match self.executor.execute(&delete) {
            Ok(_) => Ok(()),
            // `reg delete` fails when the key is already absent.
            Err(PrivilegedError::Failed { stderr, .. }) => {
                debug!(%key, %stderr, "Key not deleted");
                Ok(())
            }
            Err(source) => Err(SnapshotError::Registry {
                key: key.to_string(),
                source,
            }),
        }
    }
}

impl SnapshotStore for RegistrySnapshot {
    #[instrument(skip(self))]
    fn capture(&self) -> Result<ConfigSnapshot, SnapshotError> {
        self.dir.begin()?;

        let mut entries = Vec::with_capacity(self.keys.len());
        for (index, key) in self.keys.iter().enumerate() {
            let name = format!("{index}.reg");
            let export = PrivilegedCommand::ExportRegistry {
                key: key.clone(),
                destination: self.dir.artifact(&name),
            };
            match self.executor.execute(&export) {
                Ok(_) => {
                    let sha = self.dir.digest_of(&name)?;
                    entries.push(SnapshotEntry::saved(key.as_str(), name, sha));
                }
                // `reg export` fails for keys that do not exist yet.
                Err(PrivilegedError::Failed { stderr, .. }) => {
                    warn!(%key, %stderr, "Key not exported");
                    entries.push(SnapshotEntry::absent(key.as_str()));
                }
                Err(source) => {
                    let _ = self.dir.discard();
                    return Err(SnapshotError::Registry {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }

        let snapshot = ConfigSnapshot {
            captured_at: Utc::now(),
            backend: BackendKind::Junction,
            entries,
        };
        self.dir.commit(&snapshot)?;
        info!(keys = snapshot.entries.len(), "Registry snapshot captured");
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    fn restore(&self) -> Result<RestoreOutcome, SnapshotError> {
        let Some(snapshot) = self.dir.load()? else {
            self.dir.discard()?;
            return Ok(RestoreOutcome::NothingToRestore);
        };

        for entry in &snapshot.entries {
            self.dir.read_verified(entry)?;
        }

        let mut restored = 0;
        for entry in &snapshot.entries {
            self.delete_key(&entry.source)?;
            let Some(name) = entry.artifact.as_deref() else {
                continue;
            };
            let import = PrivilegedCommand::ImportRegistry {
                source: self.dir.artifact(name),
            };
            self.executor
                .execute(&import)
                .map_err(|source| SnapshotError::Registry {
                    key: entry.source.clone(),
                    source,
                })?;
            restored += 1;
        }

        self.dir.discard()?;
        info!(restored, "Registry snapshot restored");
        Ok(RestoreOutcome::Restored(restored))
    }

    fn pending(&self) -> bool {
        self.dir.is_complete()
    }
}
