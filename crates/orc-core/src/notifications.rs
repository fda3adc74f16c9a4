//! Process-wide notification bus (§4.6): one broadcast sender, many
//! subscribers. Delivery is best-effort — a lagging `WebSocketManager`
//! subscriber is dropped rather than allowed to block the producer.

use tokio::sync::broadcast;

use orc_protocol::Notification;

/// Ring-buffer depth per subscriber before it's considered lagging.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        NotificationBus { tx }
    }

    /// Broadcast to every current subscriber. No receivers is not an error —
    /// nobody's listening on the WebSocket yet.
    pub fn publish(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
