//! Fan-out of session events to WebSocket clients and in-process observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ws::types::{BroadcastMessage, SessionEvent, WsError};

const BROADCAST_CAPACITY: usize = 256;

/// Broadcasts messages to every subscriber.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<BroadcastMessage>,
    client_count: Arc<AtomicUsize>,
}

impl Broadcaster {
    /// Creates a new broadcaster with an empty channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            client_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribes to all messages sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> BroadcastReceiver {
        self.client_count.fetch_add(1, Ordering::SeqCst);
        debug!(client_count = self.client_count(), "Client subscribed");
        BroadcastReceiver {
            inner: self.sender.subscribe(),
            client_count: Arc::clone(&self.client_count),
        }
    }

    /// Broadcasts a message. Sending with no subscribers is not an error.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for transports that can fail.
    pub fn broadcast(&self, message: BroadcastMessage) -> Result<(), WsError> {
        match self.sender.send(message) {
            Ok(receiver_count) => debug!(receiver_count, "Broadcast sent"),
            Err(_) => debug!("Broadcast dropped, no subscribers"),
        }
        Ok(())
    }

    /// Broadcasts a session event.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.broadcast(BroadcastMessage::Event(event));
    }

    /// Returns the number of subscribers.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for broadcast messages from a broadcaster.
#[derive(Debug)]
pub struct BroadcastReceiver {
    inner: broadcast::Receiver<BroadcastMessage>,
    client_count: Arc<AtomicUsize>,
}

impl BroadcastReceiver {
    /// Receive a broadcast message.
    ///
    /// # Errors
    /// Returns `WsError::ChannelClosed` if the channel is closed or the receiver lagged.
    pub async fn recv(&mut self) -> Result<BroadcastMessage, WsError> {
        self.inner.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => WsError::ChannelClosed,
            broadcast::error::RecvError::Lagged(count) => {
                warn!(skipped = count, "Receiver lagged");
                WsError::ChannelClosed
            }
        })
    }

    /// Returns the next message if one is already queued.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        self.inner.try_recv().ok()
    }
}

impl Drop for BroadcastReceiver {
    fn drop(&mut self) {
        self.client_count.fetch_sub(1, Ordering::SeqCst);
        debug!(
            client_count = self.client_count.load(Ordering::SeqCst),
            "Client unsubscribed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcaster_tracks_client_count() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.client_count(), 0);

        let rx1 = broadcaster.subscribe();
        assert_eq!(broadcaster.client_count(), 1);

        let _rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.client_count(), 2);

        drop(rx1);
        assert_eq!(broadcaster.client_count(), 1);
    }

    #[tokio::test]
    async fn published_event_reaches_subscribers() -> Result<(), WsError> {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(SessionEvent::CleanupStarted);

        let msg = rx.recv().await?;
        assert!(matches!(
            msg,
            BroadcastMessage::Event(SessionEvent::CleanupStarted)
        ));
        assert!(rx.try_recv().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_succeeds() {
        let broadcaster = Broadcaster::new();
        assert!(broadcaster.broadcast(BroadcastMessage::Shutdown).is_ok());
    }
}
