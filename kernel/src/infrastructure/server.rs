use axum::{Router, routing::get};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::Future;
use std::sync::Arc;

use crate::api;
use crate::host::WorkspaceHost;
use crate::infrastructure::config::{BindAddress, Settings};
use crate::ws::ws_router;

async fn health_check() -> &'static str {
    "OK"
}

/// Control plane routes: REST API, event stream and liveness checks.
pub fn router(host: Arc<WorkspaceHost>) -> Router {
    Router::new()
        .route("/health/live", get(health_check))
        .route("/health/ready", get(health_check))
        .merge(api::routes())
        .merge(ws_router())
        .with_state(host)
}

/// Runs the control plane until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails to start or encounters an error while running.
pub async fn run_server(
    config: &Settings,
    host: Arc<WorkspaceHost>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))?;

    let app = router(host).route("/metrics", get(move || std::future::ready(handle.render())));

    let addr = BindAddress(config.server.host.clone(), config.server.port).to_socket_addr()?;
    tracing::info!("Control Plane listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
