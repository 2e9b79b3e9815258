// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the dispatcher.

use bm_agent::PreviewCommand;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP listen port (`MCP_SERVER_PORT`, default 3001).
pub fn server_port() -> u16 {
    env_parse("MCP_SERVER_PORT").unwrap_or(3001)
}

/// API key required on all endpoints when set (`MCP_BUILD_API_KEY`).
pub fn api_key() -> Option<String> {
    std::env::var("MCP_BUILD_API_KEY").ok().filter(|s| !s.is_empty())
}

/// Global concurrency cap (`MCP_MAX_CONCURRENT_BUILDS`, default 5).
pub fn max_concurrent_builds() -> usize {
    env_parse("MCP_MAX_CONCURRENT_BUILDS").unwrap_or(5)
}

/// Preview port pool (`MCP_PREVIEW_PORT_RANGE`, default `3100-3200`).
pub fn preview_port_range() -> RangeInclusive<u16> {
    std::env::var("MCP_PREVIEW_PORT_RANGE")
        .ok()
        .and_then(|s| parse_port_range(&s))
        .unwrap_or(3100..=3200)
}

/// Liveness threshold for running builds (`MCP_HEARTBEAT_TIMEOUT_MS`,
/// default 60s).
pub fn heartbeat_timeout() -> Duration {
    env_ms("MCP_HEARTBEAT_TIMEOUT_MS").unwrap_or(Duration::from_secs(60))
}

/// Reaper cadence (`MCP_REAPER_INTERVAL_MS`, default 30s).
pub fn reaper_interval() -> Duration {
    env_ms("MCP_REAPER_INTERVAL_MS").unwrap_or(Duration::from_secs(30))
}

/// Dev-server command template (`MCP_PREVIEW_CMD`, default `npm run dev`).
pub fn preview_command() -> PreviewCommand {
    let line = std::env::var("MCP_PREVIEW_CMD").ok();
    PreviewCommand::parse(line.as_deref())
}

/// Parent directory for per-build workspaces (`MCP_WORKSPACE_ROOT`).
pub fn workspace_root() -> PathBuf {
    std::env::var("MCP_WORKSPACE_ROOT")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./workspaces"))
}

/// Worker binary path (`MCP_WORKER_BIN`), defaulting to `bm-worker` next to
/// the running executable.
pub fn worker_bin() -> PathBuf {
    if let Some(path) = std::env::var("MCP_WORKER_BIN").ok().filter(|s| !s.is_empty()) {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join("bm-worker")))
        .unwrap_or_else(|| PathBuf::from("bm-worker"))
}

/// Parse `lo-hi` (inclusive) into a port range.
pub fn parse_port_range(s: &str) -> Option<RangeInclusive<u16>> {
    let (lo, hi) = s.split_once('-')?;
    let lo: u16 = lo.trim().parse().ok()?;
    let hi: u16 = hi.trim().parse().ok()?;
    if lo > hi {
        return None;
    }
    Some(lo..=hi)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_ms(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
