// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful subprocess termination.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::process::Child;

/// Grace window between SIGTERM and SIGKILL for agent children.
pub const AGENT_KILL_GRACE: Duration = Duration::from_secs(10);

/// Grace window between SIGTERM and SIGKILL for preview dev servers.
pub const PREVIEW_KILL_GRACE: Duration = Duration::from_secs(5);

/// SIGTERM the child, wait out the grace window, then SIGKILL.
///
/// Always reaps the child before returning so no zombie is left behind.
pub async fn kill_with_grace(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        // Already reaped
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "SIGTERM delivery failed");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            tracing::warn!(pid, grace_secs = grace.as_secs(), "grace window elapsed, sending SIGKILL");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Signal a process by pid. Returns false when the process no longer exists.
pub fn kill_by_pid(pid: u32, signal: Signal) -> bool {
    kill(Pid::from_raw(pid as i32), signal).is_ok()
}

/// Whether a process with this pid still exists (signal 0 probe).
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
