// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use yare::parameterized;

#[test]
fn default_policy_matches_config_defaults() {
    let p = RetryPolicy::default();
    assert_eq!(p.max_retries, 2);
    assert_eq!(p.max_attempts(), 3);
    assert_eq!(p.base, Duration::from_secs(2));
    assert_eq!(p.cap, Duration::from_secs(30));
}

#[parameterized(
    first = { 1, 2_000 },
    second = { 2, 4_000 },
    third = { 3, 8_000 },
    fourth = { 4, 16_000 },
    capped = { 5, 30_000 },
    far_past_cap = { 12, 30_000 },
)]
fn backoff_doubles_until_cap(attempt: u32, expected_ms: u64) {
    let p = RetryPolicy::default();
    assert_eq!(p.backoff(attempt), Duration::from_millis(expected_ms));
}

#[test]
fn zero_retries_allows_single_attempt() {
    let p = RetryPolicy::new(0, Duration::from_secs(2), Duration::from_secs(30));
    assert_eq!(p.max_attempts(), 1);
    assert!(!p.attempts_remaining(1));
}

#[test]
fn attempts_remaining_boundary() {
    let p = RetryPolicy::default();
    assert!(p.attempts_remaining(1));
    assert!(p.attempts_remaining(2));
    assert!(!p.attempts_remaining(3));
}

#[test]
fn zero_base_yields_zero_backoff() {
    let p = RetryPolicy::new(2, Duration::ZERO, Duration::from_secs(30));
    assert_eq!(p.jittered_backoff(1), Duration::ZERO);
}

proptest! {
    /// Jitter stays within ±25% of the unjittered backoff.
    #[test]
    fn jitter_within_bounds(attempt in 1u32..10, base_ms in 1u64..5_000, cap_ms in 1u64..60_000) {
        let p = RetryPolicy::new(2, Duration::from_millis(base_ms), Duration::from_millis(cap_ms));
        let raw = p.backoff(attempt).as_millis() as u64;
        let jittered = p.jittered_backoff(attempt).as_millis() as u64;
        prop_assert!(jittered >= raw - raw / 4);
        prop_assert!(jittered <= raw + raw / 4);
    }

    /// Unjittered backoff is monotone in the attempt number and never
    /// exceeds the cap.
    #[test]
    fn backoff_monotone_and_capped(a in 1u32..20, b in 1u32..20) {
        let p = RetryPolicy::default();
        if a <= b {
            prop_assert!(p.backoff(a) <= p.backoff(b));
        }
        prop_assert!(p.backoff(a) <= p.cap);
    }
}
