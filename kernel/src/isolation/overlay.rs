//! Union-mount redirection.
//!
//! Each folder gets an `upper`/`work`/`merged` triad below the working root.
//! The original folder is mounted read-only as the lower layer, so the user
//! sees their files at `merged` while every write lands in `upper`.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::catalog::UserFolder;
use super::error::IsolationError;
use super::mountinfo;
use super::privileged::{PrivilegedCommand, PrivilegedExecutor};
use super::record::{MountRecord, RecordLayout};
use super::{
    BackendKind, BackendPaths, IsolationBackend, Surface, is_link, link_dir, links_to,
    remove_if_empty, remove_link, remove_tree,
};

const UPPER: &str = "upper";
const WORK: &str = "work";
const MERGED: &str = "merged";
const LINK_SUFFIX: &str = ".secure";

#[derive(Debug, Clone)]
struct Triad {
    lower: PathBuf,
    upper: PathBuf,
    work: PathBuf,
    merged: PathBuf,
    link: PathBuf,
}

impl Triad {
    fn layers(&self) -> [&Path; 3] {
        [&self.upper, &self.work, &self.merged]
    }
}

/// Overlay variant of [`IsolationBackend`].
#[derive(Debug)]
pub struct OverlayBackend {
    paths: BackendPaths,
    executor: Arc<dyn PrivilegedExecutor>,
    records: Mutex<BTreeMap<UserFolder, MountRecord>>,
}

impl OverlayBackend {
    /// Creates a backend rooted at `paths`.
    #[must_use]
    pub fn new(paths: BackendPaths, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        Self {
            paths,
            executor,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    fn triad(&self, folder: UserFolder) -> Triad {
        let root = &self.paths.working_root;
        Triad {
            lower: folder.original_in(&self.paths.home),
            upper: folder.under(&root.join(UPPER)),
            work: folder.under(&root.join(WORK)),
            merged: folder.under(&root.join(MERGED)),
            link: self
                .paths
                .home
                .join(format!("{}{LINK_SUFFIX}", folder.dir_name())),
        }
    }

    /// Mounted for real, or emulated by a link in simulation mode.
    fn is_mounted(merged: &Path) -> bool {
        mountinfo::is_mount_point(merged) || is_link(merged)
    }

    /// Removes whatever a failed redirect left behind. Errors are logged only.
    fn discard(&self, folder: UserFolder, triad: &Triad, created_lower: bool) {
        if Self::is_mounted(&triad.merged)
            && let Err(e) = self.executor.execute(&PrivilegedCommand::Unmount {
                target: triad.merged.clone(),
            })
        {
            warn!(%folder, error = %e, "Failed to unmount during discard");
        }
        for layer in triad.layers() {
            if let Err(e) = remove_tree(layer) {
                warn!(%folder, path = %layer.display(), error = %e, "Failed to remove layer");
            }
        }
        if created_lower && let Err(e) = remove_if_empty(&triad.lower) {
            warn!(%folder, error = %e, "Failed to remove created lower folder");
        }
        self.records.lock().remove(&folder);
    }

    fn prune_layer_roots(&self) {
        for name in [UPPER, WORK, MERGED] {
            let _ = remove_if_empty(&self.paths.working_root.join(name));
        }
    }
}

impl IsolationBackend for OverlayBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Overlay
    }

    #[instrument(skip(self))]
    fn redirect(&self, folder: UserFolder) -> Result<MountRecord, IsolationError> {
        let triad = self.triad(folder);

        let created_lower = !triad.lower.exists();
        if created_lower {
            std::fs::create_dir_all(&triad.lower).map_err(|source| IsolationError::CreateDir {
                path: triad.lower.clone(),
                source,
            })?;
            debug!(path = %triad.lower.display(), "Created missing lower folder");
        }

        for layer in triad.layers() {
            if let Err(source) = std::fs::create_dir_all(layer) {
                self.discard(folder, &triad, created_lower);
                return Err(IsolationError::CreateDir {
                    path: layer.to_path_buf(),
                    source,
                });
            }
        }

        let mut record = MountRecord::prepared(
            folder,
            RecordLayout::Overlay {
                lower: triad.lower.clone(),
                upper: triad.upper.clone(),
                work: triad.work.clone(),
                merged: triad.merged.clone(),
                link: triad.link.clone(),
                created_lower,
            },
        );
        self.records.lock().insert(folder, record.clone());

        let mount = PrivilegedCommand::Mount {
            lower: triad.lower.clone(),
            upper: triad.upper.clone(),
            work: triad.work.clone(),
            merged: triad.merged.clone(),
        };
        if let Err(source) = self.executor.execute(&mount) {
            self.discard(folder, &triad, created_lower);
            return Err(IsolationError::Privileged { folder, source });
        }

        if !Self::is_mounted(&triad.merged) {
            self.discard(folder, &triad, created_lower);
            return Err(IsolationError::NotObserved {
                folder,
                path: triad.merged,
            });
        }

        if links_to(&triad.link, &triad.merged) {
            debug!(path = %triad.link.display(), "Replacing stale convenience link");
            let _ = remove_link(&triad.link);
        }
        if let Err(source) = link_dir(&triad.merged, &triad.link) {
            self.discard(folder, &triad, created_lower);
            return Err(IsolationError::fs("link", triad.link, source));
        }

        record.mark_active();
        self.records.lock().insert(folder, record.clone());
        info!(%folder, merged = %triad.merged.display(), "Folder mounted");
        Ok(record)
    }

    #[instrument(skip(self))]
    fn restore(&self, folder: UserFolder) -> Result<(), IsolationError> {
        let triad = self.triad(folder);
        let created_lower = self
            .records
            .lock()
            .get(&folder)
            .is_some_and(|r| matches!(r.layout(), RecordLayout::Overlay { created_lower: true, .. }));

        if links_to(&triad.link, &triad.merged) {
            remove_link(&triad.link)
                .map_err(|source| IsolationError::fs("remove link", &triad.link, source))?;
            debug!(path = %triad.link.display(), "Removed convenience link");
        }

        if Self::is_mounted(&triad.merged) {
            self.executor
                .execute(&PrivilegedCommand::Unmount {
                    target: triad.merged.clone(),
                })
                .map_err(|source| IsolationError::Privileged { folder, source })?;
            if Self::is_mounted(&triad.merged) {
                return Err(IsolationError::NotObserved {
                    folder,
                    path: triad.merged,
                });
            }
            info!(%folder, "Folder unmounted");
        }

        for layer in triad.layers() {
            remove_tree(layer).map_err(|source| IsolationError::fs("remove", layer, source))?;
        }
        if created_lower {
            remove_if_empty(&triad.lower)
                .map_err(|source| IsolationError::fs("remove", &triad.lower, source))?;
        }

        if let Some(mut record) = self.records.lock().remove(&folder) {
            record.mark_released();
            debug!(%folder, state = ?record.state(), "Record dropped");
        }
        self.prune_layer_roots();
        Ok(())
    }

    fn surface(&self, folder: UserFolder) -> Surface {
        let triad = self.triad(folder);
        Surface {
            folder,
            writable: triad.merged,
            tracked: triad.upper,
        }
    }

    fn records(&self) -> Vec<MountRecord> {
        self.records.lock().values().cloned().collect()
    }
}
