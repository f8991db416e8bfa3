//! Filesystem redirection of the user-data folder catalog.
//!
//! One capability interface, [`IsolationBackend`], with two variants selected
//! once at process start: [`OverlayBackend`] (union mounts) and
//! [`JunctionBackend`] (directory junctions). Both run their OS primitives
//! through a [`PrivilegedExecutor`].

pub mod catalog;
pub mod error;
pub mod junction;
pub mod mountinfo;
pub mod overlay;
pub mod privileged;
pub mod record;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub use catalog::UserFolder;
pub use error::{IsolationError, PrivilegedError};
pub use junction::JunctionBackend;
pub use overlay::OverlayBackend;
pub use privileged::{
    CommandOutput, Escalation, PrivilegedCommand, PrivilegedExecutor, SimulatedExecutor,
    SystemExecutor,
};
pub use record::{MountRecord, MountState, RecordLayout};

/// The two redirection variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Union/overlay mounts.
    Overlay,
    /// Directory junctions.
    Junction,
}

impl BackendKind {
    /// Variant for the host platform.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(windows) {
            Self::Junction
        } else {
            Self::Overlay
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlay => f.write_str("overlay"),
            Self::Junction => f.write_str("junction"),
        }
    }
}

/// Where a redirected folder is written and where its changes are observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Surface {
    /// Folder the surface belongs to.
    pub folder: UserFolder,
    /// Path the user writes to (overlay `merged`, junction sandbox).
    pub writable: PathBuf,
    /// Path the change tracker walks (overlay `upper`, junction sandbox).
    pub tracked: PathBuf,
}

impl Surface {
    /// Maps a path found under `tracked` onto `writable`.
    #[must_use]
    pub fn display_path(&self, tracked_path: &Path) -> PathBuf {
        tracked_path
            .strip_prefix(&self.tracked)
            .map_or_else(|_| tracked_path.to_path_buf(), |rel| self.writable.join(rel))
    }
}

/// Host locations a backend works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPaths {
    /// User home containing the original folders.
    pub home: PathBuf,
    /// Private working root for layers, sandboxes and snapshots.
    pub working_root: PathBuf,
}

/// Capability interface shared by both redirection variants.
///
/// Methods block (privileged commands may wait on a consent prompt); async
/// callers go through `spawn_blocking`.
pub trait IsolationBackend: Send + Sync + fmt::Debug {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Redirects `folder`. On success the returned record is
    /// [`MountState::Active`]; on failure nothing of `folder` stays redirected.
    ///
    /// # Errors
    ///
    /// Returns an error if a private directory, the privileged primitive, or
    /// the post-condition check fails.
    fn redirect(&self, folder: UserFolder) -> Result<MountRecord, IsolationError>;

    /// Reverses the redirection of `folder`. Succeeds when there is nothing
    /// to undo, with or without a record.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing redirection could not be removed.
    fn restore(&self, folder: UserFolder) -> Result<(), IsolationError>;

    /// Writable surface and tracked root of `folder`.
    fn surface(&self, folder: UserFolder) -> Surface;

    /// Records for folders currently known to the backend.
    fn records(&self) -> Vec<MountRecord>;
}

/// Creates a directory link at `link` resolving to `target`.
pub(crate) fn link_dir(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }
}

/// Removes a directory link without touching its target.
pub(crate) fn remove_link(link: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        std::fs::remove_dir(link)
    }
    #[cfg(not(windows))]
    {
        std::fs::remove_file(link)
    }
}

/// Returns `true` if `path` is a symlink or junction (not followed).
pub(crate) fn is_link(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink() || is_junction(&m))
}

#[cfg(windows)]
fn is_junction(metadata: &std::fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    metadata.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0
}

#[cfg(not(windows))]
fn is_junction(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Returns `true` if `link` is a link resolving to `target`.
pub(crate) fn links_to(link: &Path, target: &Path) -> bool {
    std::fs::read_link(link)
        .is_ok_and(|resolved| dunce::simplified(&resolved) == dunce::simplified(target))
}

/// Returns `true` if `path` is a real directory (not a link).
pub(crate) fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.is_dir() && !is_junction(&m))
}

/// Removes `path` if it is an empty directory; a no-op otherwise.
pub(crate) fn remove_if_empty(path: &Path) -> io::Result<()> {
    match std::fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                std::fs::remove_dir(path)
            } else {
                Ok(())
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes a directory tree, treating "already gone" as success.
pub(crate) fn remove_tree(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_path_maps_tracked_onto_writable() {
        let surface = Surface {
            folder: UserFolder::Documents,
            writable: PathBuf::from("/w/merged/Documents"),
            tracked: PathBuf::from("/w/upper/Documents"),
        };
        assert_eq!(
            surface.display_path(Path::new("/w/upper/Documents/a/note.txt")),
            PathBuf::from("/w/merged/Documents/a/note.txt")
        );
        assert_eq!(
            surface.display_path(Path::new("/elsewhere/x")),
            PathBuf::from("/elsewhere/x")
        );
    }

    #[test]
    fn links_are_detected_and_removed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        std::fs::create_dir(&target)?;
        link_dir(&target, &link)?;

        assert!(is_link(&link));
        assert!(!is_real_dir(&link));
        assert!(is_real_dir(&target));

        remove_link(&link)?;
        assert!(!is_link(&link));
        assert!(target.is_dir());
        Ok(())
    }

    #[test]
    fn remove_if_empty_keeps_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let full = dir.path().join("full");
        std::fs::create_dir(&full)?;
        std::fs::write(full.join("f"), b"x")?;
        remove_if_empty(&full)?;
        assert!(full.exists());

        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty)?;
        remove_if_empty(&empty)?;
        assert!(!empty.exists());

        remove_if_empty(&dir.path().join("missing"))?;
        Ok(())
    }
}
