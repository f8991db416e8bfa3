//! Directory-junction redirection.
//!
//! The original folder is renamed aside to `<F>.backup` and replaced by a
//! junction pointing at a private sandbox folder. Restore removes the junction
//! and renames the backup back. Both directions are idempotent so a crashed
//! session can be cleaned up without its records.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::catalog::UserFolder;
use super::error::IsolationError;
use super::privileged::{PrivilegedCommand, PrivilegedExecutor};
use super::record::{MountRecord, RecordLayout};
use super::{
    BackendKind, BackendPaths, IsolationBackend, Surface, is_link, links_to, remove_if_empty,
    remove_link, remove_tree,
};

const SANDBOX: &str = "sandbox";
const BACKUP_SUFFIX: &str = ".backup";

fn exists_no_follow(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Junction variant of [`IsolationBackend`].
#[derive(Debug)]
pub struct JunctionBackend {
    paths: BackendPaths,
    executor: Arc<dyn PrivilegedExecutor>,
    records: Mutex<BTreeMap<UserFolder, MountRecord>>,
}

impl JunctionBackend {
    /// Creates a backend rooted at `paths`.
    #[must_use]
    pub fn new(paths: BackendPaths, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            paths,
            executor,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    fn original(&self, folder: UserFolder) -> PathBuf {
        folder.original_in(&self.paths.home)
    }

    fn backup(&self, folder: UserFolder) -> PathBuf {
        self.paths
            .home
            .join(format!("{}{BACKUP_SUFFIX}", folder.dir_name()))
    }

    fn sandbox(&self, folder: UserFolder) -> PathBuf {
        folder.under(&self.paths.working_root.join(SANDBOX))
    }

    /// `true` if `link` is a junction into `sandbox`.
    fn points_into(link: &Path, sandbox: &Path) -> bool {
        links_to(link, sandbox)
    }

    fn discard(&self, folder: UserFolder, sandbox: &Path) {
        if let Err(e) = remove_tree(sandbox) {
            warn!(%folder, error = %e, "Failed to remove sandbox");
        }
        let _ = remove_if_empty(&self.paths.working_root.join(SANDBOX));
        self.records.lock().remove(&folder);
    }

    fn revert_rename(folder: UserFolder, backup: &Path, original: &Path) {
        if let Err(e) = std::fs::rename(backup, original) {
            warn!(%folder, error = %e, "Failed to move backup back into place");
        }
    }
}

impl IsolationBackend for JunctionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Junction
    }

    #[instrument(skip(self))]
    fn redirect(&self, folder: UserFolder) -> Result<MountRecord, IsolationError> {
        let original = self.original(folder);
        let backup = self.backup(folder);
        let sandbox = self.sandbox(folder);

        std::fs::create_dir_all(&sandbox).map_err(|source| IsolationError::CreateDir {
            path: sandbox.clone(),
            source,
        })?;

        let mut record = MountRecord::prepared(
            folder,
            RecordLayout::Junction {
                original: original.clone(),
                backup: backup.clone(),
                sandbox: sandbox.clone(),
            },
        );
        self.records.lock().insert(folder, record.clone());

        // Junction left over from a session that never restored.
        if is_link(&original) && exists_no_follow(&backup) && Self::points_into(&original, &sandbox)
        {
            debug!(path = %original.display(), "Removing stale junction");
            if let Err(source) = remove_link(&original) {
                self.discard(folder, &sandbox);
                return Err(IsolationError::fs("remove stale junction", original, source));
            }
        }

        let mut renamed = false;
        if exists_no_follow(&original) {
            if exists_no_follow(&backup) {
                self.discard(folder, &sandbox);
                return Err(IsolationError::BackupConflict { original, backup });
            }
            if let Err(source) = std::fs::rename(&original, &backup) {
                self.discard(folder, &sandbox);
                return Err(IsolationError::fs("move aside", original, source));
            }
            renamed = true;
            debug!(from = %original.display(), to = %backup.display(), "Moved original aside");
        }

        let junction = PrivilegedCommand::CreateJunction {
            link: original.clone(),
            target: sandbox.clone(),
        };
        if let Err(source) = self.executor.execute(&junction) {
            if renamed {
                Self::revert_rename(folder, &backup, &original);
            }
            self.discard(folder, &sandbox);
            return Err(IsolationError::Privileged { folder, source });
        }

        if !is_link(&original) {
            if renamed && !exists_no_follow(&original) {
                Self::revert_rename(folder, &backup, &original);
            }
            self.discard(folder, &sandbox);
            return Err(IsolationError::NotObserved {
                folder,
                path: original,
            });
        }

        record.mark_active();
        self.records.lock().insert(folder, record.clone());
        info!(%folder, sandbox = %sandbox.display(), "Folder linked");
        Ok(record)
    }

    #[instrument(skip(self))]
    fn restore(&self, folder: UserFolder) -> Result<(), IsolationError> {
        let original = self.original(folder);
        let backup = self.backup(folder);
        let sandbox = self.sandbox(folder);

        // A link we did not create (e.g. a folder moved to another drive) is the user's.
        if is_link(&original) {
            if !Self::points_into(&original, &sandbox) {
                debug!(path = %original.display(), "Foreign link left in place");
                return Ok(());
            }
            remove_link(&original)
                .map_err(|source| IsolationError::fs("remove junction", &original, source))?;
            debug!(path = %original.display(), "Removed junction");
        }

        if exists_no_follow(&backup) {
            if exists_no_follow(&original) {
                return Err(IsolationError::BackupConflict { original, backup });
            }
            std::fs::rename(&backup, &original)
                .map_err(|source| IsolationError::fs("move back", &backup, source))?;
            info!(%folder, "Original folder restored");
        }

        remove_tree(&sandbox).map_err(|source| IsolationError::fs("remove", &sandbox, source))?;
        let _ = remove_if_empty(&self.paths.working_root.join(SANDBOX));

        if let Some(mut record) = self.records.lock().remove(&folder) {
            record.mark_released();
            debug!(%folder, state = ?record.state(), "Record dropped");
        }
        Ok(())
    }

    fn surface(&self, folder: UserFolder) -> Surface {
        let sandbox = self.sandbox(folder);
        Surface {
            folder,
            writable: sandbox.clone(),
            tracked: sandbox,
        }
    }

    fn records(&self) -> Vec<MountRecord> {
        self.records.lock().values().cloned().collect()
    }
}
