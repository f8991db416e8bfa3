//! Handlers of the session control plane.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::api::session::types::{
    FilesResponse, HealthResponse, SessionResponse, StartResponse, StartResult, StopResponse,
    SyncRequest, SyncResponse,
};
use crate::host::WorkspaceHost;
use crate::session::{SessionError, SessionStatus, StartError, StartOutcome, StopError, StopOutcome};
use crate::sync::{self, CloudProvider};
use crate::tracker::TrackedFile;
use crate::ws::SessionEvent;

/// API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Starting the session failed.
    #[error(transparent)]
    Start(#[from] StartError),
    /// Stopping the session failed.
    #[error(transparent)]
    Stop(#[from] StopError),
    /// Sync needs an Active session.
    #[error("No active session")]
    NotActive,
    /// No storage gateway is configured.
    #[error("Cloud sync is not configured")]
    SyncDisabled(CloudProvider),
    /// Validation error.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Start(_) => "start_failed",
            Self::Stop(_) => "stop_failed",
            Self::NotActive => "not_active",
            Self::SyncDisabled(_) => "sync_disabled",
            Self::ValidationError(_) => "validation",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Start(StartError::StopInProgress)
            | ApiError::Start(StartError::State(SessionError::InvalidTransition { .. }))
            | ApiError::Stop(StopError::State(_))
            | ApiError::NotActive => StatusCode::CONFLICT,
            ApiError::Start(_) | ApiError::Stop(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SyncDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        };
        let folder = match &self {
            ApiError::Start(e) => e.folder().map(|f| f.to_string()),
            _ => None,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "error_type": self.kind(),
            "folder": folder,
        }));

        (status, body).into_response()
    }
}

/// GET /health
pub async fn health_check(State(host): State<Arc<WorkspaceHost>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        session: host.manager().status(),
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/session
pub async fn get_session(State(host): State<Arc<WorkspaceHost>>) -> Json<SessionResponse> {
    let manager = host.manager();
    Json(SessionResponse {
        session: manager.session(),
        mounts: manager.mount_records(),
    })
}

/// POST /api/v1/session/start
///
/// Starts a session, or reports that one is already running.
pub async fn start_session(
    State(host): State<Arc<WorkspaceHost>>,
) -> Result<Json<StartResponse>, ApiError> {
    let manager = host.manager();
    let result = match manager.start_session().await? {
        StartOutcome::Started => StartResult::Started,
        StartOutcome::AlreadyActive => StartResult::AlreadyActive,
    };
    Ok(Json(StartResponse {
        result,
        session: manager.session(),
    }))
}

/// POST /api/v1/session/stop
///
/// Stops the session and returns the cleanup report.
pub async fn stop_session(
    State(host): State<Arc<WorkspaceHost>>,
) -> Result<Json<StopResponse>, ApiError> {
    let response = match host.manager().stop_session().await? {
        StopOutcome::NotRunning => StopResponse {
            summary: "not_running".to_string(),
            warnings: Vec::new(),
            report: None,
        },
        StopOutcome::Completed(report) => StopResponse {
            summary: report.summary(),
            warnings: report.warnings(),
            report: Some(report),
        },
    };
    Ok(Json(response))
}

/// GET /api/v1/session/files
pub async fn list_files(State(host): State<Arc<WorkspaceHost>>) -> Json<FilesResponse> {
    let files = host.manager().current_inventory();
    Json(FilesResponse {
        total_bytes: files.total_bytes(),
        files,
    })
}

/// POST /api/v1/sync
///
/// Uploads the selected files. Progress is broadcast as `sync_progress`
/// events; files not yet uploaded when the session stops fail as cancelled.
pub async fn sync_files(
    State(host): State<Arc<WorkspaceHost>>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    if req.file_ids.is_empty() {
        return Err(ApiError::ValidationError(
            "file_ids must not be empty".to_string(),
        ));
    }
    let manager = Arc::clone(host.manager());
    if manager.status() != SessionStatus::Active {
        return Err(ApiError::NotActive);
    }
    let uploader = host
        .uploader(req.provider)
        .ok_or(ApiError::SyncDisabled(req.provider))?;

    let inventory = manager.current_inventory();
    let wanted: HashSet<usize> = req.file_ids.iter().copied().collect();
    let selected: Vec<TrackedFile> = inventory
        .iter()
        .filter(|f| wanted.contains(&f.id))
        .cloned()
        .collect();
    if selected.len() != wanted.len() {
        let known: HashSet<usize> = selected.iter().map(|f| f.id).collect();
        let mut unknown: Vec<usize> = wanted.difference(&known).copied().collect();
        unknown.sort_unstable();
        return Err(ApiError::ValidationError(format!(
            "Unknown file ids: {unknown:?}"
        )));
    }

    info!(files = selected.len(), provider = %req.provider, "Sync requested");
    let broadcaster = manager.broadcaster().clone();
    let report = sync::sync_files(
        &uploader,
        &selected,
        |progress| {
            broadcaster.publish(SessionEvent::SyncProgress {
                completed: progress.completed,
                total: progress.total,
                percent: progress.percent(),
            });
        },
        || !manager.is_active(),
    )
    .await;

    Ok(Json(report))
}
