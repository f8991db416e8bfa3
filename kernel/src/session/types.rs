//! Session data and lifecycle errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cleanup::{CleanupAborted, CleanupReport};
use crate::isolation::{BackendKind, IsolationError, UserFolder};
use crate::snapshot::SnapshotError;
use crate::tracker::TrackerError;

/// Lifecycle state of the single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session; the host is in its normal state.
    Idle,
    /// Folders are being redirected.
    Starting,
    /// All folders are redirected and tracked.
    Active,
    /// The cleanup pipeline is running.
    Stopping,
    /// A start or stop did not complete; residue may exist.
    Failed,
}

/// Snapshot of the session owned by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Id of the current or last start attempt.
    pub id: Uuid,
    /// Current state.
    pub status: SessionStatus,
    /// Set when the session became Active.
    pub started_at: Option<DateTime<Utc>>,
    /// Folders under isolation, in catalog order.
    pub redirected_paths: Vec<UserFolder>,
    /// Redirection variant, fixed for the process.
    pub backend: BackendKind,
}

impl Session {
    pub(crate) fn idle(backend: BackendKind) -> Self {
        Self {
            id: Uuid::nil(),
            status: SessionStatus::Idle,
            started_at: None,
            redirected_paths: Vec::new(),
            backend,
        }
    }
}

/// Successful result of `start_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is Active.
    Started,
    /// A session was already Starting or Active; nothing changed.
    AlreadyActive,
}

/// Successful result of `stop_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no session.
    NotRunning,
    /// The cleanup pipeline ran.
    Completed(CleanupReport),
}

/// An invalid state transition was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `from -> to` is not in the transition table.
    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: SessionStatus,
        /// Requested state.
        to: SessionStatus,
    },
}

/// Why a session could not start. Rollback has already run.
#[derive(Debug, Error)]
pub enum StartError {
    /// Redirecting a folder failed.
    #[error("Failed to redirect {folder}: {source}")]
    Redirect {
        /// Folder that failed.
        folder: UserFolder,
        /// Source error.
        #[source]
        source: IsolationError,
        /// Folders whose rollback failed.
        unrestored: Vec<UserFolder>,
    },
    /// Capturing the configuration snapshot failed.
    #[error("Failed to capture configuration snapshot: {source}")]
    Snapshot {
        /// Source error.
        #[source]
        source: SnapshotError,
        /// Folders whose rollback failed.
        unrestored: Vec<UserFolder>,
    },
    /// The change tracker could not start.
    #[error("Failed to start change tracker: {source}")]
    Tracker {
        /// Source error.
        #[source]
        source: TrackerError,
        /// Folders whose rollback failed.
        unrestored: Vec<UserFolder>,
    },
    /// A stop is running.
    #[error("Session is stopping")]
    StopInProgress,
    /// A blocking start step panicked.
    #[error("Session start aborted: {reason}")]
    Aborted {
        /// Panic or cancellation message.
        reason: String,
        /// Folders whose rollback failed.
        unrestored: Vec<UserFolder>,
    },
    /// Invalid transition.
    #[error(transparent)]
    State(#[from] SessionError),
}

impl StartError {
    /// Folder the failure is attributed to.
    #[must_use]
    pub fn folder(&self) -> Option<UserFolder> {
        match self {
            Self::Redirect { folder, .. } => Some(*folder),
            _ => None,
        }
    }

    /// Folders left redirected after rollback.
    #[must_use]
    pub fn unrestored(&self) -> &[UserFolder] {
        match self {
            Self::Redirect { unrestored, .. }
            | Self::Snapshot { unrestored, .. }
            | Self::Tracker { unrestored, .. }
            | Self::Aborted { unrestored, .. } => unrestored,
            _ => &[],
        }
    }
}

/// Why a stop did not complete.
#[derive(Debug, Error)]
pub enum StopError {
    /// The cleanup pipeline panicked.
    #[error(transparent)]
    Aborted(#[from] CleanupAborted),
    /// Invalid transition.
    #[error(transparent)]
    State(#[from] SessionError),
}
