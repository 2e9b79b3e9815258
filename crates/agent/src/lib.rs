// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-agent: subprocess adapters for the code-generation agent and the
//! preview dev server.
//!
//! The agent is an opaque CLI: it reads a prompt on stdin and writes
//! artifacts into the build workspace. This crate owns everything about that
//! boundary: spawning, feeding stdin, streaming stdout/stderr with a bounded
//! in-process tail, timeout and cancellation kills, and classifying the exit
//! into the transient/fatal taxonomy the runner retries on.

mod adapter;
mod classify;
mod cli;
mod command;
mod preview;
mod subprocess;
mod tail;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use adapter::{
    AgentAdapter, AgentError, AgentOutcome, AgentRequest, AgentRun, LogChunk, OutputStream,
};
pub use classify::classify;
pub use cli::CliAgent;
pub use command::AgentCommand;
pub use preview::PreviewCommand;
pub use subprocess::{
    kill_by_pid, kill_with_grace, pid_alive, AGENT_KILL_GRACE, PREVIEW_KILL_GRACE,
};
pub use tail::Tail;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgent, ScriptedRun};
