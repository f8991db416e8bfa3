//! Routes of the session control plane.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::api::session::handlers::{
    get_session, health_check, list_files, start_session, stop_session, sync_files,
};
use crate::host::WorkspaceHost;

/// Session endpoints under `/api/v1` plus `/health`.
pub fn routes() -> Router<Arc<WorkspaceHost>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/session", get(get_session))
        .route("/api/v1/session/start", post(start_session))
        .route("/api/v1/session/stop", post(stop_session))
        .route("/api/v1/session/files", get(list_files))
        .route("/api/v1/sync", post(sync_files))
}
