// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted agent double for runner tests.

use crate::adapter::{
    AgentAdapter, AgentError, AgentOutcome, AgentRequest, AgentRun, LogChunk, OutputStream,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted invocation result.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub outcome: AgentOutcome,
    pub stdout: String,
    pub stderr: String,
    /// Simulated agent runtime before the outcome lands.
    pub delay: Duration,
}

impl ScriptedRun {
    pub fn success() -> Self {
        Self {
            outcome: AgentOutcome::Success,
            stdout: "done\n".to_string(),
            stderr: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn transient(reason: &str) -> Self {
        Self {
            outcome: AgentOutcome::Transient(reason.to_string()),
            stdout: String::new(),
            stderr: format!("{reason}\n"),
            delay: Duration::ZERO,
        }
    }

    pub fn fatal(reason: &str) -> Self {
        Self {
            outcome: AgentOutcome::Fatal(reason.to_string()),
            stdout: String::new(),
            stderr: format!("{reason}\n"),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Scripted [`AgentAdapter`]: pops one [`ScriptedRun`] per invocation and
/// records every request it saw.
#[derive(Clone, Default)]
pub struct FakeAgent {
    script: Arc<Mutex<VecDeque<ScriptedRun>>>,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted invocation result.
    pub fn push(&self, run: ScriptedRun) {
        self.script.lock().push_back(run);
    }

    /// Script `n` consecutive successes.
    pub fn push_successes(&self, n: usize) {
        for _ in 0..n {
            self.push(ScriptedRun::success());
        }
    }

    /// Every request the adapter has served, in order.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().clone()
    }

    /// Prompts served, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl AgentAdapter for FakeAgent {
    async fn run(
        &self,
        req: AgentRequest,
        log_tx: mpsc::Sender<LogChunk>,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError> {
        self.requests.lock().push(req.clone());

        let scripted = self.script.lock().pop_front().unwrap_or_else(ScriptedRun::success);

        if !scripted.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(scripted.delay) => {}
                _ = cancel.cancelled() => {
                    return Ok(AgentRun {
                        outcome: AgentOutcome::Cancelled,
                        stderr_tail: String::new(),
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        if !scripted.stdout.is_empty() {
            let _ = log_tx
                .try_send(LogChunk { stream: OutputStream::Stdout, content: scripted.stdout });
        }
        if !scripted.stderr.is_empty() {
            let _ = log_tx.try_send(LogChunk {
                stream: OutputStream::Stderr,
                content: scripted.stderr.clone(),
            });
        }

        Ok(AgentRun {
            outcome: scripted.outcome,
            stderr_tail: scripted.stderr,
            duration: scripted.delay,
        })
    }
}
