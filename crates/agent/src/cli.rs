// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real agent adapter: spawns the configured CLI per prompt.

use crate::adapter::{
    AgentAdapter, AgentError, AgentOutcome, AgentRequest, AgentRun, LogChunk, OutputStream,
};
use crate::classify::classify;
use crate::command::AgentCommand;
use crate::subprocess::{kill_with_grace, AGENT_KILL_GRACE};
use crate::tail::Tail;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const READ_BUF: usize = 4096;

/// Agent adapter that invokes the external code-generation CLI.
///
/// One subprocess per prompt: the prompt goes in on stdin, artifacts land in
/// the workspace, output is streamed to the log channel with a rolling tail
/// retained for classification.
#[derive(Clone)]
pub struct CliAgent {
    command: AgentCommand,
}

impl CliAgent {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl AgentAdapter for CliAgent {
    async fn run(
        &self,
        req: AgentRequest,
        log_tx: mpsc::Sender<LogChunk>,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError> {
        let span = tracing::info_span!("agent.run", workspace = %req.workspace.display());
        async {
            let start = Instant::now();
            let result = self.run_inner(&req, log_tx, cancel).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(run) => tracing::info!(outcome = ?run.outcome, elapsed_ms, "agent finished"),
                Err(e) => tracing::error!(error = %e, elapsed_ms, "agent invocation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

impl CliAgent {
    async fn run_inner(
        &self,
        req: &AgentRequest,
        log_tx: mpsc::Sender<LogChunk>,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .current_dir(&req.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(AgentError::Spawn)?;

        // Feed the prompt and close stdin so the agent sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(req.prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stdout_tail = Arc::new(Mutex::new(Tail::default()));
        let stderr_tail = Arc::new(Mutex::new(Tail::default()));

        let stdout_task = child.stdout.take().map(|out| {
            tokio::spawn(pump(out, OutputStream::Stdout, log_tx.clone(), stdout_tail.clone()))
        });
        let stderr_task = child.stderr.take().map(|err| {
            tokio::spawn(pump(err, OutputStream::Stderr, log_tx.clone(), stderr_tail.clone()))
        });

        let mut timed_out = false;
        let mut cancelled = false;
        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = tokio::time::sleep(req.timeout) => {
                timed_out = true;
                kill_with_grace(&mut child, AGENT_KILL_GRACE).await;
                None
            }
            _ = cancel.cancelled() => {
                cancelled = true;
                kill_with_grace(&mut child, AGENT_KILL_GRACE).await;
                None
            }
        };

        // Drain the readers; they finish once the child's pipes close.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let stderr_text = stderr_tail.lock().to_string_lossy();
        let outcome = if cancelled {
            AgentOutcome::Cancelled
        } else {
            classify(status, timed_out, &stderr_text)
        };

        Ok(AgentRun { outcome, stderr_tail: stderr_text, duration: start.elapsed() })
    }
}

/// Read a stream to EOF in bounded chunks, feeding the tail and log channel.
async fn pump<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    stream: OutputStream,
    log_tx: mpsc::Sender<LogChunk>,
    tail: Arc<Mutex<Tail>>,
) {
    let mut buf = [0u8; READ_BUF];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                tail.lock().push(&buf[..n]);
                let content = String::from_utf8_lossy(&buf[..n]).into_owned();
                // A full or closed log channel never blocks the agent.
                let _ = log_tx.try_send(LogChunk { stream, content });
            }
            Err(e) => {
                tracing::debug!(stream = %stream, error = %e, "agent output read failed");
                break;
            }
        }
    }
}
