//! Error types for isolation backends and the privileged executor.

use std::path::PathBuf;
use thiserror::Error;

use super::catalog::UserFolder;

/// Errors raised while running a privileged command.
#[derive(Debug, Error)]
pub enum PrivilegedError {
    /// The user dismissed or refused the elevation prompt.
    #[error("Elevation was declined for '{command}'")]
    Declined {
        /// Short description of the command.
        command: String,
    },
    /// The command could not be spawned at all.
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The command ran and exited unsuccessfully.
    #[error("'{command}' exited with code {code:?}: {stderr}")]
    Failed {
        /// Short description of the command.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The command is not available on this platform or escalation mode.
    #[error("'{command}' is not supported here: {reason}")]
    Unsupported {
        /// Short description of the command.
        command: String,
        /// Why the command cannot run.
        reason: String,
    },
    /// A simulated primitive failed (simulation mode and tests).
    #[error("Simulated '{command}' failed: {reason}")]
    Simulated {
        /// Short description of the command.
        command: String,
        /// Injected or observed failure.
        reason: String,
    },
}

impl PrivilegedError {
    /// Returns `true` when the failure came from the user refusing consent.
    #[must_use]
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined { .. })
    }
}

/// Errors raised by isolation backends.
#[derive(Debug, Error)]
pub enum IsolationError {
    /// A private directory could not be created.
    #[error("Failed to create {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The privileged primitive (mount, junction) failed.
    #[error("Privileged operation failed for {folder}: {source}")]
    Privileged {
        /// Folder being redirected or restored.
        folder: UserFolder,
        /// Source error.
        #[source]
        source: PrivilegedError,
    },
    /// The primitive reported success but the redirection is not visible.
    #[error("Redirection of {folder} was not observed at {path}")]
    NotObserved {
        /// Folder being redirected.
        folder: UserFolder,
        /// Path that should have been redirected.
        path: PathBuf,
    },
    /// Both the original folder and its backup exist as real folders.
    #[error("Both {original} and its backup {backup} exist; refusing to overwrite either")]
    BackupConflict {
        /// Original folder location.
        original: PathBuf,
        /// Backup folder location.
        backup: PathBuf,
    },
    /// A filesystem operation on a host folder failed.
    #[error("Failed to {action} {path}: {source}")]
    Filesystem {
        /// What was being done.
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
}

impl IsolationError {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}
