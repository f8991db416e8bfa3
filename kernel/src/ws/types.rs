//! Domain types for WebSocket broadcasting.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionStatus;
use crate::tracker::FileInventory;

/// Identifies one connected WebSocket client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle and inventory notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session moved to a new state.
    StatusChanged {
        /// Session id.
        session_id: Uuid,
        /// New state.
        status: SessionStatus,
    },
    /// The change tracker published a new inventory.
    InventoryChanged {
        /// Full inventory, not a diff.
        files: Arc<FileInventory>,
    },
    /// Teardown began.
    CleanupStarted,
    /// Teardown finished, possibly with warnings.
    CleanupCompleted {
        /// "completed" or "completed with N warnings".
        summary: String,
        /// One line per warning.
        warnings: Vec<String>,
    },
    /// Teardown could not run to completion.
    CleanupFailed {
        /// Failure description.
        reason: String,
    },
    /// A start attempt failed and was rolled back.
    SessionStartFailed {
        /// Folder that failed, if any.
        folder: Option<String>,
        /// Failure description.
        reason: String,
    },
    /// Progress of a cloud sync run.
    SyncProgress {
        /// Files handled so far.
        completed: usize,
        /// Files selected.
        total: usize,
        /// Whole-number percentage.
        percent: u8,
    },
}

/// Message carried by the broadcast channel.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// A session notification.
    Event(SessionEvent),
    /// The daemon is shutting down.
    Shutdown,
}

impl BroadcastMessage {
    /// Converts the message to a WebSocket frame payload.
    ///
    /// # Errors
    ///
    /// Returns an error if an event cannot be serialized to JSON.
    pub fn to_frame_payload(&self) -> Result<String, WsError> {
        match self {
            Self::Event(event) => serde_json::to_string(event).map_err(WsError::Serialization),
            Self::Shutdown => Ok(r#"{"type":"shutdown"}"#.to_string()),
        }
    }
}

/// Errors raised by the WebSocket layer.
#[derive(Debug, Error)]
pub enum WsError {
    /// Transport error from axum.
    #[error("WebSocket connection error: {0}")]
    AxumWs(#[from] axum::Error),

    /// An event could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The broadcast channel closed or this receiver fell too far behind.
    #[error("Broadcast channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_unique() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }

    #[test]
    fn broadcast_message_shutdown_serializes() -> Result<(), WsError> {
        let payload = BroadcastMessage::Shutdown.to_frame_payload()?;
        assert_eq!(payload, r#"{"type":"shutdown"}"#);
        Ok(())
    }

    #[test]
    fn events_are_tagged() -> anyhow::Result<()> {
        let payload = BroadcastMessage::Event(SessionEvent::CleanupCompleted {
            summary: "completed with 1 warning".into(),
            warnings: vec!["browser scrub (Chrome): locked".into()],
        })
        .to_frame_payload()?;
        let json: serde_json::Value = serde_json::from_str(&payload)?;
        assert_eq!(json["type"], "cleanup_completed");
        assert_eq!(json["warnings"][0], "browser scrub (Chrome): locked");

        let json = serde_json::to_value(SessionEvent::StatusChanged {
            session_id: Uuid::nil(),
            status: SessionStatus::Stopping,
        })?;
        assert_eq!(json["status"], "stopping");
        Ok(())
    }
}
