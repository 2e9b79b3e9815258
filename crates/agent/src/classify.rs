// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit classification: transient vs fatal.
//!
//! The agent carries no structured error channel, so classification is a
//! substring heuristic over the stderr tail. It is monotone per attempt: an
//! outcome classified fatal is never downgraded.

use crate::adapter::AgentOutcome;
use std::process::ExitStatus;

/// Sentinels that mark an attempt as not worth retrying. Matched
/// case-insensitively against the stderr tail.
const FATAL_MARKERS: &[&str] = &[
    "fatal:",
    "fatal error",
    "authentication_error",
    "invalid api key",
    "permission_error",
    "credit balance is too low",
];

fn fatal_marker_in(stderr_tail: &str) -> Option<&'static str> {
    let lower = stderr_tail.to_lowercase();
    FATAL_MARKERS.iter().find(|m| lower.contains(**m)).copied()
}

/// Classify a completed agent invocation.
///
/// `status` is `None` when we killed the child ourselves; `timed_out` wins
/// over everything (the exit status after a timeout kill is just our own
/// SIGTERM/SIGKILL).
pub fn classify(status: Option<ExitStatus>, timed_out: bool, stderr_tail: &str) -> AgentOutcome {
    if timed_out {
        return AgentOutcome::Transient("agent timed out".to_string());
    }

    if let Some(marker) = fatal_marker_in(stderr_tail) {
        return AgentOutcome::Fatal(format!("agent reported fatal error ({marker})"));
    }

    match status.and_then(|s| s.code()) {
        Some(0) => AgentOutcome::Success,
        Some(code) => AgentOutcome::Transient(format!("agent exited with code {code}")),
        // Killed by a signal we didn't send
        None => AgentOutcome::Transient("agent killed by signal".to_string()),
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
