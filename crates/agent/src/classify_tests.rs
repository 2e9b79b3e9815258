// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::process::ExitStatusExt;
use yare::parameterized;

fn exited(code: i32) -> Option<ExitStatus> {
    Some(ExitStatus::from_raw(code << 8))
}

fn signalled(sig: i32) -> Option<ExitStatus> {
    Some(ExitStatus::from_raw(sig))
}

#[test]
fn clean_exit_is_success() {
    assert_eq!(classify(exited(0), false, ""), AgentOutcome::Success);
}

#[test]
fn nonzero_exit_is_transient() {
    let outcome = classify(exited(1), false, "some stack trace");
    assert_eq!(outcome, AgentOutcome::Transient("agent exited with code 1".to_string()));
}

#[test]
fn timeout_wins_over_status() {
    let outcome = classify(None, true, "");
    assert_eq!(outcome, AgentOutcome::Transient("agent timed out".to_string()));
}

#[test]
fn signal_death_is_transient() {
    let outcome = classify(signalled(9), false, "");
    assert!(matches!(outcome, AgentOutcome::Transient(_)));
}

#[parameterized(
    fatal_prefix = { "FATAL: out of credits" },
    fatal_error = { "node: fatal error: heap limit" },
    auth = { "AUTHENTICATION_ERROR: bad token" },
    api_key = { "Invalid API key provided" },
    permission = { "PERMISSION_ERROR: workspace denied" },
    billing = { "Your credit balance is too low" },
)]
fn fatal_markers_classify_fatal(stderr: &str) {
    let outcome = classify(exited(1), false, stderr);
    assert!(matches!(outcome, AgentOutcome::Fatal(_)), "expected fatal for {stderr:?}");
}

#[test]
fn fatal_marker_overrides_clean_exit() {
    let outcome = classify(exited(0), false, "FATAL: corrupted workspace");
    assert!(matches!(outcome, AgentOutcome::Fatal(_)));
}

#[test]
fn marker_match_is_case_insensitive() {
    let outcome = classify(exited(1), false, "Fatal: nope");
    assert!(matches!(outcome, AgentOutcome::Fatal(_)));
}

#[test]
fn plain_stderr_does_not_trip_markers() {
    let outcome = classify(exited(1), false, "warning: deprecated dependency");
    assert!(matches!(outcome, AgentOutcome::Transient(_)));
}
