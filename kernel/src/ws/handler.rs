//! WebSocket upgrade handler.

use axum::{
    Router,
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
    routing::get,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::host::WorkspaceHost;
use crate::ws::connection::Connection;
use crate::ws::types::SessionEvent;

/// GET /ws
///
/// Upgrades to a socket that receives every [`SessionEvent`], starting with
/// the current status and inventory.
pub async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(host): State<Arc<WorkspaceHost>>,
) -> Response {
    info!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| async move {
        let manager = host.manager();
        // Subscribe before reading state so nothing falls between the two.
        let receiver = manager.broadcaster().subscribe();
        let session = manager.session();
        let greeting = vec![
            SessionEvent::StatusChanged {
                session_id: session.id,
                status: session.status,
            },
            SessionEvent::InventoryChanged {
                files: manager.current_inventory(),
            },
        ];

        if let Err(e) = Connection::new(socket, receiver).run(greeting).await {
            error!(error = %e, "WebSocket connection error");
        }
    })
}

/// Router serving the event stream at `/ws`.
pub fn ws_router() -> Router<Arc<WorkspaceHost>> {
    Router::new().route("/ws", get(handle_ws_upgrade))
}
