//! Request/response types of the session API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cleanup::CleanupReport;
use crate::isolation::MountRecord;
use crate::session::{Session, SessionStatus};
use crate::sync::{CloudProvider, SyncReport};
use crate::tracker::FileInventory;

/// Health check response payload.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: String,
    /// Session state at the time of the check.
    pub session: SessionStatus,
    /// Timestamp of the check.
    pub timestamp: DateTime<Utc>,
}

/// Session state and the backend's records.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    /// The session.
    #[serde(flatten)]
    pub session: Session,
    /// Per-folder records held by the backend.
    pub mounts: Vec<MountRecord>,
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartResult {
    /// A new session started.
    Started,
    /// A session was already Starting or Active.
    AlreadyActive,
}

/// Start response payload.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    /// What happened.
    pub result: StartResult,
    /// Session after the request.
    pub session: Session,
}

/// Stop response payload.
#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    /// `"not_running"` or the cleanup summary.
    pub summary: String,
    /// One line per warning.
    pub warnings: Vec<String>,
    /// Full cleanup report, absent when nothing was running.
    pub report: Option<CleanupReport>,
}

/// Inventory response payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesResponse {
    /// Latest published inventory.
    pub files: Arc<FileInventory>,
    /// Sum of all file sizes.
    pub total_bytes: u64,
}

/// Request to upload tracked files.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    /// Inventory ids of the files to upload.
    pub file_ids: Vec<usize>,
    /// Target provider.
    pub provider: CloudProvider,
}

/// Sync response payload.
pub type SyncResponse = SyncReport;
