// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded-exponential retry policy with jitter.

use rand::Rng;
use std::time::Duration;

/// Retry policy for transient step failures.
///
/// `max_retries` counts retries, not attempts: a policy with `max_retries = 2`
/// allows 3 attempts total. Backoff for attempt `n` (1-based) is
/// `min(base · 2^(n−1), cap)` with ±25% uniform jitter. Without jitter,
/// synchronized failures across concurrent builds produce thundering-herd
/// store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base: Duration::from_secs(2), cap: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, cap: Duration) -> Self {
        Self { max_retries, base, cap }
    }

    /// Total attempts allowed (retries + the first attempt).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Unjittered backoff after a failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let raw = self.base.saturating_mul(2u32.saturating_pow(exp));
        raw.min(self.cap)
    }

    /// Backoff with ±25% uniform jitter applied.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff(attempt).as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let spread = base_ms / 4;
        let jittered = rand::rng().random_range(base_ms.saturating_sub(spread)..=base_ms + spread);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
