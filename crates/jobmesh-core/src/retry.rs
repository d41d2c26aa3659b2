//! Fixed-delay retry policy.
//!
//! Attempts are numbered from 1. A job with `retries = r` runs at most
//! `r + 1` times, waiting the same delay before every retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether attempt number `attempt` (just failed) may be followed by another.
pub fn should_retry(attempt: u32, retries: u32) -> bool {
    attempt <= retries
}

/// Delay before the attempt following `attempt`.
pub fn next_delay(_attempt: u32, retry_delay_ms: u64) -> Duration {
    Duration::from_millis(retry_delay_ms)
}

/// Bounded, fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Policy allowing `retries` retries, `delay` apart.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Policy with a single attempt.
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Total number of attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        should_retry(attempt, self.retries)
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        next_delay(attempt, self.delay.as_millis() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}
