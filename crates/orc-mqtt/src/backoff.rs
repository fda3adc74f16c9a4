//! Exponential reconnect backoff, capped (§4.1, §5: "automatic reconnect
//! with exponential backoff (cap 30s)").

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(cap: Duration) -> Self {
        Backoff {
            attempt: 0,
            base: Duration::from_millis(250),
            cap,
        }
    }

    /// Duration to wait before the next reconnect attempt, then advances
    /// the internal counter. `2^attempt * base`, capped.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u64.checked_shl(self.attempt.min(20)).unwrap_or(u64::MAX);
        let millis = (self.base.as_millis() as u64).saturating_mul(factor);
        self.attempt += 1;
        Duration::from_millis(millis).min(self.cap)
    }

    /// Reset after a successful (re)connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
