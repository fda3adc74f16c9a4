//! Periodic handshake ping (§4.1): every `handshake_interval`, publish
//! `{}` on `attributes/request/<id>` and await the echo on
//! `response/<id>` within `handshake_timeout`. A successful echo resets
//! `last_seen`; three consecutive failures (§4.1) should demote the
//! device's `ConnectionState` to `Disconnected` — the driver only reports
//! the outcome, since only the device's owner loop may call
//! `Device::transition` (§4.2).

use std::sync::Arc;
use std::time::Duration;

use orc_protocol::topics;

use crate::channel::Channel;
use crate::driver::Driver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Success,
    Failed { consecutive_failures: u32 },
}

/// Runs forever, ticking once per `interval`. Intended to be spawned
/// alongside the session's event-loop driver task.
pub async fn run<C: Channel>(
    driver: Arc<Driver<C>>,
    interval: Duration,
    timeout: Duration,
    failure_threshold: u32,
    mut on_outcome: impl FnMut(HandshakeOutcome) + Send,
) {
    let mut consecutive_failures: u32 = 0;
    let mut ticker = tokio::time::interval(interval);
    // `interval` fires immediately on its first tick; skip it so the very
    // first handshake happens one interval after the session starts.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let outcome = tick(&driver, timeout).await;
        match outcome {
            Ok(()) => {
                consecutive_failures = 0;
                on_outcome(HandshakeOutcome::Success);
            }
            Err(()) => {
                consecutive_failures += 1;
                on_outcome(HandshakeOutcome::Failed {
                    consecutive_failures,
                });
                if consecutive_failures >= failure_threshold {
                    // Caller is responsible for demoting ConnectionState;
                    // we keep counting so every subsequent failure is
                    // still reported.
                }
            }
        }
    }
}

async fn tick<C: Channel>(driver: &Driver<C>, timeout: Duration) -> Result<(), ()> {
    driver
        .request(
            &topics::attributes_request_prefix(),
            &topics::attributes_response_prefix(),
            b"{}".to_vec(),
            timeout,
        )
        .await
        .map(|_| ())
        .map_err(|_| ())
}
