//! Backoff and status classification for the resumable publish stream.
//!
//! A failed stream is reopened after `backoff(attempt)` scaled by a random
//! factor in `[0.75, 1.25]`. With the defaults the waits go 100ms, 200ms,
//! 400ms and so on up to 30s, after which every reconnect waits about 30s.
//!
//! Stream retries have no attempt limit: a partition publisher keeps
//! reconnecting for as long as failures are transient. Only a non-retryable
//! status (or shutdown) ends it.
//!
//! ## Status classes
//!
//! Transient:
//! - `DEADLINE_EXCEEDED`, `UNAVAILABLE`, `ABORTED`
//! - `INTERNAL`, `UNKNOWN`
//! - `RESOURCE_EXHAUSTED`: server applying backpressure
//!
//! Permanent: every other code, e.g. `NOT_FOUND`,
//! `PERMISSION_DENIED`, `INVALID_ARGUMENT`, `FAILED_PRECONDITION`.

use std::time::Duration;
use tonic::{Code, Status};

/// Exponential backoff configuration for stream reconnection.
///
/// # Examples
///
/// ```ignore
/// let policy = RetryPolicy::new(Duration::from_millis(50), Duration::from_secs(10), 2.0);
/// assert_eq!(policy.backoff(2), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first reconnect.
    pub initial_backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in [0.75, 1.25].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_backoff: Duration, max_backoff: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Un-jittered delay before reconnect number `attempt` (0-based).
    ///
    /// `initial_backoff * multiplier^attempt`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_backoff.as_millis() as f64;
        Duration::from_millis(backoff_ms.min(max_ms) as u64)
    }

    /// Delay actually slept before reconnect number `attempt`.
    pub fn delay(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter {
            return base;
        }
        let jitter = 0.75 + (rand::random::<f64>() * 0.5); // 0.75-1.25x
        Duration::from_millis((base.as_millis() as f64 * jitter) as u64)
    }

    /// Whether a stream failing with `status` should be reconnected.
    pub fn is_retryable(&self, status: &Status) -> bool {
        matches!(
            status.code(),
            Code::DeadlineExceeded
                | Code::Unavailable
                | Code::Aborted
                | Code::Internal
                | Code::Unknown
                | Code::ResourceExhausted
        )
    }
}
