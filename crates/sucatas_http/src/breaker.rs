//! Per-host circuit breaker.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
enum State {
    /// Traffic flows; counts consecutive failures.
    Closed { failures: u32 },
    /// Traffic blocked until the reset window elapses.
    Open { opened_at: Instant },
    /// One probe request is in flight after the reset window.
    HalfOpen,
}

/// Answer to "may I send a request to this host right now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Allow,
    /// The reset window elapsed; this request is the half-open probe.
    Probe,
    Block,
}

/// Tracks one breaker per host. Opens after `failure_threshold` consecutive
/// failures, blocks for `reset_timeout`, then lets a single probe through:
/// success closes the breaker, failure re-opens it for another window.
pub struct BreakerRegistry {
    failure_threshold: u32,
    reset_timeout: Duration,
    states: Mutex<HashMap<String, State>>,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, host: &str) -> BreakerDecision {
        let mut states = self.states.lock().expect("breaker lock");
        let state = states
            .entry(host.to_string())
            .or_insert(State::Closed { failures: 0 });
        match *state {
            State::Closed { .. } => BreakerDecision::Allow,
            State::HalfOpen => BreakerDecision::Block,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    *state = State::HalfOpen;
                    BreakerDecision::Probe
                } else {
                    BreakerDecision::Block
                }
            }
        }
    }

    pub fn on_success(&self, host: &str) {
        let mut states = self.states.lock().expect("breaker lock");
        states.insert(host.to_string(), State::Closed { failures: 0 });
    }

    /// Record a failure. Returns true when this failure transitioned the
    /// breaker from closed/half-open to open, so callers can emit the
    /// `circuit_open` event exactly once per opening.
    pub fn on_failure(&self, host: &str) -> bool {
        let mut states = self.states.lock().expect("breaker lock");
        let state = states
            .entry(host.to_string())
            .or_insert(State::Closed { failures: 0 });
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    warn!(host, failures, "circuit breaker opened");
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                    true
                } else {
                    *state = State::Closed { failures };
                    false
                }
            }
            State::HalfOpen => {
                warn!(host, "circuit breaker re-opened after failed probe");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
                true
            }
            State::Open { .. } => false,
        }
    }
}
