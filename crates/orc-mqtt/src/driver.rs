//! Per-device MQTT session driver: publish/subscribe, the
//! request/response correlator, and per-topic fan-out to subscribers
//! (§4.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

use orc_protocol::ConnectionState;

use crate::channel::Channel;
use crate::config::MqttConfig;
use crate::correlator::Correlator;
use crate::error::{MqttError, MqttResult};

/// A single incoming publish, handed to every subscriber whose topic
/// matches.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

type Subscriber = mpsc::UnboundedSender<IncomingMessage>;

/// Drives one device's MQTT session. Owns the correlator and the
/// topic → subscriber fan-out table; publishes its live `ConnectionState`
/// on a `watch` channel for the device's owner loop to observe and act on
/// (only the owner may call `Device::transition`, so the driver never
/// calls it itself — §4.2).
pub struct Driver<C: Channel> {
    channel: RwLock<Arc<C>>,
    correlator: Correlator,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    connection_state: watch::Sender<ConnectionState>,
    request_timeout: Duration,
}

impl<C: Channel> Driver<C> {
    pub fn new(
        channel: Arc<C>,
        config: &MqttConfig,
    ) -> (Arc<Self>, watch::Receiver<ConnectionState>) {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let driver = Arc::new(Driver {
            channel: RwLock::new(channel),
            correlator: Correlator::new(),
            subscribers: Mutex::new(HashMap::new()),
            connection_state: tx,
            request_timeout: config.request_timeout(),
        });
        (driver, rx)
    }

    /// Rebind the live channel after a reconnect (§4.1 session lifecycle):
    /// in-process subscriber registrations survive the swap since the
    /// session loop re-issues the broker-level wildcard subscribe on the
    /// new channel; only the publish/request path needs to stop pointing
    /// at the dropped connection.
    pub async fn set_channel(&self, channel: Arc<C>) {
        *self.channel.write().await = channel;
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.borrow()
    }

    fn set_connection_state(&self, state: ConnectionState) {
        let _ = self.connection_state.send(state);
    }

    /// Publish raw bytes to `topic` (§4.1 `Publish`).
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        self.channel.read().await.publish(topic, payload).await
    }

    /// Subscribe to `topic`; every matching publish is sent to `handler`.
    /// Registering more than one handler on the same topic is allowed
    /// (§4.1: "multiple handlers per topic allowed").
    pub async fn subscribe(&self, topic: &str, handler: Subscriber) -> MqttResult<()> {
        self.channel.read().await.subscribe(topic).await?;
        self.subscribers
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Issue a correlated request (§4.1 `Request`): appends a random
    /// message id to both `topic_req` and `topic_resp_prefix`, subscribes
    /// to the response topic, publishes, and awaits the matching reply or
    /// `timeout`.
    pub async fn request(
        &self,
        topic_req: &str,
        topic_resp_prefix: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> MqttResult<Vec<u8>> {
        let id = random_id();
        let req_topic = format!("{topic_req}/{id}");
        let resp_topic = format!("{topic_resp_prefix}/{id}");

        let live = self.channel.read().await.clone();
        let rx = self.correlator.register(&resp_topic).await;
        if let Err(e) = live.subscribe(&resp_topic).await {
            self.correlator.cancel(&resp_topic).await;
            return Err(e);
        }

        if let Err(e) = live.publish(&req_topic, &payload).await {
            self.correlator.cancel(&resp_topic).await;
            let _ = live.unsubscribe(&resp_topic).await;
            return Err(e);
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        let _ = live.unsubscribe(&resp_topic).await;

        match outcome {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(MqttError::Disconnected),
            Err(_) => {
                self.correlator.cancel(&resp_topic).await;
                Err(MqttError::Timeout)
            }
        }
    }

    /// [`Driver::request`] using the driver's configured default timeout.
    pub async fn request_default_timeout(
        &self,
        topic_req: &str,
        topic_resp_prefix: &str,
        payload: Vec<u8>,
    ) -> MqttResult<Vec<u8>> {
        self.request(topic_req, topic_resp_prefix, payload, self.request_timeout)
            .await
    }

    /// Dispatch one incoming publish: resolve a waiting `Request` first,
    /// then fan out to every subscriber of that exact topic ("handlers
    /// run in the event loop of the driver", §4.1).
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) {
        if self.correlator.resolve(topic, payload.to_vec()).await {
            return;
        }

        let subscribers = self.subscribers.lock().await;
        if let Some(handlers) = subscribers.get(topic) {
            for handler in handlers {
                let _ = handler.send(IncomingMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                });
            }
        }
    }

    /// Fail every pending `Request` and mark the session down (§4.1: "on
    /// socket error... pending Requests fail with `Disconnected`").
    pub async fn on_disconnected(&self) {
        self.correlator.fail_all().await;
        self.set_connection_state(ConnectionState::Disconnected);
    }

    pub fn on_connecting(&self) {
        self.set_connection_state(ConnectionState::Connecting);
    }

    pub fn on_connected(&self) {
        self.set_connection_state(ConnectionState::Connected);
    }
}

fn random_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}", rng.gen::<u64>())
}

/// Object-safe facade over [`Driver`], so `orc-core` (device state machine,
/// deployment tasks) can hold `Arc<dyn MqttPort>` instead of threading the
/// `Channel` type parameter through every component.
#[async_trait]
pub trait MqttPort: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()>;
    async fn subscribe(&self, topic: &str, handler: Subscriber) -> MqttResult<()>;
    async fn request(
        &self,
        topic_req: &str,
        topic_resp_prefix: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> MqttResult<Vec<u8>>;
    async fn request_default_timeout(
        &self,
        topic_req: &str,
        topic_resp_prefix: &str,
        payload: Vec<u8>,
    ) -> MqttResult<Vec<u8>>;
    fn connection_state(&self) -> ConnectionState;
}

#[async_trait]
impl<C: Channel + 'static> MqttPort for Driver<C> {
    async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        Driver::publish(self, topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: Subscriber) -> MqttResult<()> {
        Driver::subscribe(self, topic, handler).await
    }

    async fn request(
        &self,
        topic_req: &str,
        topic_resp_prefix: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> MqttResult<Vec<u8>> {
        Driver::request(self, topic_req, topic_resp_prefix, payload, timeout).await
    }

    async fn request_default_timeout(
        &self,
        topic_req: &str,
        topic_resp_prefix: &str,
        payload: Vec<u8>,
    ) -> MqttResult<Vec<u8>> {
        Driver::request_default_timeout(self, topic_req, topic_resp_prefix, payload).await
    }

    fn connection_state(&self) -> ConnectionState {
        Driver::connection_state(self)
    }
}
