//! File-based snapshot used on overlay hosts.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::manifest::{ConfigSnapshot, SnapshotDir, SnapshotEntry};
use super::{RestoreOutcome, SNAPSHOT_DIR, SnapshotError, SnapshotStore};
use crate::isolation::BackendKind;

/// Desktop configuration files that point at the user folders.
#[must_use]
pub fn default_sources(home: &Path) -> Vec<PathBuf> {
    vec![
        home.join(".config/user-dirs.dirs"),
        home.join(".config/gtk-3.0/bookmarks"),
        home.join(".local/share/user-places.xbel"),
    ]
}

/// Copies a list of configuration files aside and writes them back.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    dir: SnapshotDir,
    sources: Vec<PathBuf>,
}

impl FileSnapshot {
    /// Snapshot of `sources`, stored below `working_root`.
    #[must_use]
    pub fn new(working_root: &Path, sources: Vec<PathBuf>) -> Self {
        Self {
            dir: SnapshotDir::new(working_root.join(SNAPSHOT_DIR)),
            sources,
        }
    }

    fn artifact_name(index: usize, source: &Path) -> String {
        let stem = source
            .file_name()
            .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned());
        format!("{index}-{stem}")
    }
}

impl SnapshotStore for FileSnapshot {
    #[instrument(skip(self))]
    fn capture(&self) -> Result<ConfigSnapshot, SnapshotError> {
        self.dir.begin()?;

        let mut entries = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            let label = source.to_string_lossy().into_owned();
            match std::fs::read(source) {
                Ok(bytes) => {
                    let name = Self::artifact_name(index, source);
                    let sha = self.dir.write_artifact(&name, &bytes)?;
                    entries.push(SnapshotEntry::saved(label, name, sha));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(source = %source.display(), "Not present at capture");
                    entries.push(SnapshotEntry::absent(label));
                }
                Err(e) => {
                    let _ = self.dir.discard();
                    return Err(SnapshotError::io(source, e));
                }
            }
        }

        let snapshot = ConfigSnapshot {
            captured_at: Utc::now(),
            backend: BackendKind::Overlay,
            entries,
        };
        self.dir.commit(&snapshot)?;
        info!(entries = snapshot.entries.len(), "Configuration snapshot captured");
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    fn restore(&self) -> Result<RestoreOutcome, SnapshotError> {
        let Some(snapshot) = self.dir.load()? else {
            self.dir.discard()?;
            return Ok(RestoreOutcome::NothingToRestore);
        };

        // Verify everything before writing anything back.
        let mut contents = Vec::with_capacity(snapshot.entries.len());
        for entry in &snapshot.entries {
            contents.push(self.dir.read_verified(entry)?);
        }

        let mut restored = 0;
        for (entry, bytes) in snapshot.entries.iter().zip(contents) {
            let target = PathBuf::from(&entry.source);
            match bytes {
                Some(bytes) => {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| SnapshotError::io(parent, e))?;
                    }
                    std::fs::write(&target, bytes).map_err(|e| SnapshotError::io(&target, e))?;
                    restored += 1;
                }
                None => match std::fs::remove_file(&target) {
                    Ok(()) => {
                        debug!(path = %target.display(), "Removed file created during session");
                        restored += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SnapshotError::io(&target, e)),
                },
            }
        }

        self.dir.discard()?;
        info!(restored, "Configuration snapshot restored");
        Ok(RestoreOutcome::Restored(restored))
    }

    fn pending(&self) -> bool {
        self.dir.is_complete()
    }
}
