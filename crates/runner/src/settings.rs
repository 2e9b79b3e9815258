// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner tuning knobs, read from `MCP_*` environment variables.

use bm_core::RetryPolicy;
use std::time::Duration;

/// Timing and retry configuration for one worker.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Cadence of `last_heartbeat` writes (default 15s).
    pub heartbeat_interval: Duration,
    /// Per-step wall-clock budget for one agent invocation (default 10min).
    pub step_timeout: Duration,
    /// Backoff policy for transient step failures.
    pub retry: RetryPolicy,
    /// Cadence of the cancellation poll against the build row (default 5s).
    pub cancel_poll_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(15_000),
            step_timeout: Duration::from_millis(600_000),
            retry: RetryPolicy::default(),
            cancel_poll_interval: Duration::from_millis(5_000),
        }
    }
}

impl RunnerSettings {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            heartbeat_interval: env_ms("MCP_HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval),
            step_timeout: env_ms("MCP_STEP_TIMEOUT_MS", defaults.step_timeout),
            retry: RetryPolicy::new(
                env_u32("MCP_MAX_RETRIES", defaults.retry.max_retries),
                env_ms("MCP_RETRY_BASE_MS", defaults.retry.base),
                env_ms("MCP_RETRY_MAX_MS", defaults.retry.cap),
            ),
            cancel_poll_interval: env_ms("MCP_CANCEL_POLL_MS", defaults.cancel_poll_interval),
        }
    }
}

fn env_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
