//! `MockChannel` — an in-memory `Channel` double for driving `Driver` and
//! deployment-task tests without a real broker (§10.5 ambient test
//! tooling).

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::channel::Channel;
use crate::error::MqttResult;

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Records every publish/subscribe/unsubscribe call. Tests can either
/// inspect the recorded history synchronously (`published()`,
/// `is_subscribed_to()`) or drain publishes as they happen via
/// `next_published()`, to simulate a device reacting to a request as it
/// lands.
pub struct MockChannel {
    history: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
    tx: mpsc::UnboundedSender<PublishedMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<PublishedMessage>>,
}

impl MockChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        MockChannel {
            history: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.history.lock().await.clone()
    }

    pub async fn is_subscribed_to(&self, topic: &str) -> bool {
        self.subscriptions.lock().await.iter().any(|t| t == topic)
    }

    pub async fn last_published(&self) -> Option<PublishedMessage> {
        self.history.lock().await.last().cloned()
    }

    /// Await the next publish issued through this channel (FIFO order,
    /// one consumer). Used to script a fake device's reaction to an
    /// outgoing request in task/driver tests.
    pub async fn next_published(&self) -> Option<PublishedMessage> {
        self.rx.lock().await.recv().await
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        let msg = PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        self.history.lock().await.push(msg.clone());
        let _ = self.tx.send(msg);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> MqttResult<()> {
        self.subscriptions.lock().await.push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> MqttResult<()> {
        self.subscriptions.lock().await.retain(|t| t != topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_and_streams_messages() {
        let mock = MockChannel::new();
        mock.publish("a/b", b"hello").await.unwrap();

        assert_eq!(mock.published().await.len(), 1);
        let streamed = mock.next_published().await.unwrap();
        assert_eq!(streamed.topic, "a/b");
        assert_eq!(streamed.payload, b"hello");
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_clears_membership() {
        let mock = MockChannel::new();
        mock.subscribe("x/y").await.unwrap();
        assert!(mock.is_subscribed_to("x/y").await);

        mock.unsubscribe("x/y").await.unwrap();
        assert!(!mock.is_subscribed_to("x/y").await);
    }
}
