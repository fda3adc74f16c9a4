//! Request/response correlator (§4.1, §8): matches an incoming publish to
//! the pending `Request` awaiting a reply on that exact topic.
//!
//! Correlation is by topic alone — the response topic already carries the
//! generated message id as its trailing segment (`<prefix>/<id>`), so a
//! reply is identified by exact topic match, not by parsing the payload.
//! This is also what lets the driver tolerate the V1 `DirectGetImage`
//! quirk (§9 Open Questions) where the RPC envelope itself omits `res_id`.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Correlator {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register interest in `topic`, returning a receiver that resolves
    /// when [`Correlator::resolve`] is called with a matching topic, or
    /// that errors out when [`Correlator::fail_all`] runs first.
    pub async fn register(&self, topic: &str) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(topic.to_string(), tx);
        rx
    }

    /// Drop a registration without resolving it (used after a timeout, so
    /// a late reply — §8 boundary case — finds no waiter and is silently
    /// dropped rather than crashing a handler).
    pub async fn cancel(&self, topic: &str) {
        self.pending.lock().await.remove(topic);
    }

    /// Resolve the waiter registered for `topic`, if any. Returns `true`
    /// if a waiter was found and handed the payload (§8: "its completion
    /// is triggered only by the message whose `res_id == x`" — here,
    /// whose topic matches exactly).
    pub async fn resolve(&self, topic: &str, payload: Vec<u8>) -> bool {
        if let Some(tx) = self.pending.lock().await.remove(topic) {
            let _ = tx.send(payload);
            true
        } else {
            false
        }
    }

    /// Fail every outstanding registration (§4.1: "pending Requests fail
    /// with `Disconnected`" on session loss). Dropping the sender makes
    /// the paired receiver resolve to `Err`.
    pub async fn fail_all(&self) {
        self.pending.lock().await.clear();
    }
}
