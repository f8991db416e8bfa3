//! Session event fan-out over a broadcast channel and WebSocket.

pub mod broadcaster;
pub mod connection;
pub mod handler;
pub mod types;

pub use broadcaster::{BroadcastReceiver, Broadcaster};
pub use handler::ws_router;
pub use types::{BroadcastMessage, ClientId, SessionEvent, WsError};
