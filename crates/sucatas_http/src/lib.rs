//! Resilient HTTP layer for the ingestion pipeline.
//!
//! One process-wide client wraps reqwest with:
//! - a per-host minimum-interval rate limiter,
//! - retry with capped exponential backoff and jitter,
//! - a per-host circuit breaker with a half-open probe,
//! - an in-run tombstone set for 404/410 URLs.
//!
//! Expected HTTP failures never cross the pipeline boundary as errors; every
//! call returns a structured [`FetchOutcome`].

mod breaker;
mod client;
mod limit;
mod outcome;

pub use breaker::{BreakerDecision, BreakerRegistry};
pub use client::{HttpClient, HttpClientError};
pub use limit::HostRateLimiter;
pub use outcome::{ErrorClass, FetchOutcome};

use rand::Rng;
use std::time::Duration;

/// Backoff delay before retry `attempt` (0-based): `base * 2^attempt`,
/// capped, then scaled by a jitter factor in `[0.85, 1.15]`.
pub fn backoff_delay(attempt: u32, base_secs: f64, cap_secs: f64) -> Duration {
    let exp = (base_secs * 2_f64.powi(attempt as i32)).min(cap_secs);
    let jitter = rand::thread_rng().gen_range(0.85..=1.15);
    Duration::from_secs_f64((exp * jitter).max(0.1))
}
