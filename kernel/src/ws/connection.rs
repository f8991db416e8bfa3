//! One WebSocket subscriber.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::ws::broadcaster::BroadcastReceiver;
use crate::ws::types::{BroadcastMessage, ClientId, SessionEvent, WsError};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A subscriber socket. Clients only listen; control goes through REST.
pub struct Connection {
    client_id: ClientId,
    stream: WebSocket,
    receiver: BroadcastReceiver,
}

impl Connection {
    /// Wraps an upgraded socket and its broadcast subscription.
    pub fn new(stream: WebSocket, receiver: BroadcastReceiver) -> Self {
        let client_id = ClientId::generate();
        info!(client_id = %client_id, "WebSocket connection established");
        Self {
            client_id,
            stream,
            receiver,
        }
    }

    /// Returns the client ID for this connection.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Sends `greeting` so a late subscriber sees the current state, then
    /// forwards every broadcast until the client leaves or the daemon shuts
    /// down.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket fails or an event cannot be serialized.
    pub async fn run(mut self, greeting: Vec<SessionEvent>) -> Result<(), WsError> {
        for event in greeting {
            self.send(BroadcastMessage::Event(event)).await?;
        }

        let mut ping_interval = interval(PING_INTERVAL);
        loop {
            tokio::select! {
                incoming = self.stream.next() => {
                    match incoming {
                        Some(Ok(msg)) => {
                            if self.handle_incoming(msg).await? {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!(client_id = %self.client_id, error = %e, "WebSocket error");
                            return Err(WsError::AxumWs(e));
                        }
                        None => {
                            debug!(client_id = %self.client_id, "Stream ended");
                            return Ok(());
                        }
                    }
                }

                broadcast = self.receiver.recv() => {
                    match broadcast {
                        Ok(BroadcastMessage::Shutdown) => {
                            self.send(BroadcastMessage::Shutdown).await?;
                            info!(client_id = %self.client_id, "Shutdown broadcast received");
                            break;
                        }
                        Ok(msg) => self.send(msg).await?,
                        Err(_) => {
                            info!(client_id = %self.client_id, "Broadcast channel closed");
                            break;
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    self.stream
                        .send(Message::Ping(Bytes::new()))
                        .await
                        .map_err(WsError::AxumWs)?;
                }
            }
        }

        self.graceful_close().await
    }

    async fn handle_incoming(&mut self, message: Message) -> Result<bool, WsError> {
        match message {
            Message::Ping(data) => {
                self.stream
                    .send(Message::Pong(data))
                    .await
                    .map_err(WsError::AxumWs)?;
                Ok(false)
            }
            Message::Close(_) => {
                info!(client_id = %self.client_id, "Client initiated close");
                Ok(true)
            }
            Message::Text(_) | Message::Binary(_) | Message::Pong(_) => {
                debug!(client_id = %self.client_id, "Ignoring client frame");
                Ok(false)
            }
        }
    }

    async fn send(&mut self, message: BroadcastMessage) -> Result<(), WsError> {
        let payload = message.to_frame_payload()?;
        self.stream
            .send(Message::Text(payload.into()))
            .await
            .map_err(WsError::AxumWs)
    }

    async fn graceful_close(mut self) -> Result<(), WsError> {
        self.stream
            .send(Message::Close(None))
            .await
            .map_err(WsError::AxumWs)?;
        info!(client_id = %self.client_id, "Connection closed");
        Ok(())
    }
}
