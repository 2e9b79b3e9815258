// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`AgentAdapter`] trait and its request/outcome types.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Errors spawning or driving the agent subprocess.
///
/// These are host-side failures; an agent that runs and exits badly is not an
/// error but an [`AgentOutcome`].
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent: {0}")]
    Spawn(std::io::Error),

    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which stream a chunk of agent output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

bm_core::simple_display! {
    OutputStream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// A chunk of agent output, forwarded to the log writer as it is read.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub stream: OutputStream,
    pub content: String,
}

/// One agent invocation: a single prompt against a workspace.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub workspace: PathBuf,
    pub timeout: Duration,
}

/// Classified result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Exit 0, no fatal sentinel in output
    Success,
    /// Worth another attempt: non-fatal non-zero exit, signal death, timeout
    Transient(String),
    /// Not worth retrying: fatal sentinel in output
    Fatal(String),
    /// Killed because the build was cancelled
    Cancelled,
}

impl AgentOutcome {
    /// The failure reason, for step `error` fields and logs.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AgentOutcome::Transient(r) | AgentOutcome::Fatal(r) => Some(r),
            AgentOutcome::Success => None,
            AgentOutcome::Cancelled => Some("cancelled"),
        }
    }
}

/// Completed agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: AgentOutcome,
    /// Last 8 KiB of stderr, for error reporting without re-reading the store.
    pub stderr_tail: String,
    pub duration: Duration,
}

/// Boundary to the code-generation agent subprocess.
///
/// Implemented by [`crate::CliAgent`] for the real CLI and by
/// [`crate::FakeAgent`] with scripted outcomes for tests.
#[async_trait]
pub trait AgentAdapter: Send + Sync + 'static {
    /// Run one prompt to completion (or timeout/cancellation).
    ///
    /// Output is streamed to `log_tx` as it is produced; send failures are
    /// ignored so a slow log writer cannot stall the agent.
    async fn run(
        &self,
        req: AgentRequest,
        log_tx: mpsc::Sender<LogChunk>,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError>;
}
