//! Per-host minimum-interval rate limiter.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes requests per host so that no two leave less than the
/// configured interval apart. Each `acquire` reserves the next slot while
/// holding the lock, then sleeps outside it, so concurrent workers queue
/// fairly instead of stampeding when the lock is released.
pub struct HostRateLimiter {
    interval: Duration,
    slots: Mutex<HashMap<String, Instant>>,
}

impl HostRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until this host's next slot is due.
    pub async fn acquire(&self, host: &str) {
        if self.interval.is_zero() {
            return;
        }
        let wait = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            let next = match slots.get(host) {
                Some(last) => (*last + self.interval).max(now),
                None => now,
            };
            slots.insert(host.to_string(), next);
            next.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
