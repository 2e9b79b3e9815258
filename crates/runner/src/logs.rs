// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step log writer task.
//!
//! Agent output chunks arrive on a bounded channel and are appended to the
//! `build_logs` table one row per chunk. Store failures are logged and the
//! chunk dropped; log durability never gates the build.

use bm_agent::{LogChunk, OutputStream};
use bm_core::{BuildId, StepId};
use bm_store::{BuildStore, LogEntry, LogStream};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn stream_of(stream: OutputStream) -> LogStream {
    match stream {
        OutputStream::Stdout => LogStream::Stdout,
        OutputStream::Stderr => LogStream::Stderr,
    }
}

/// Spawn a writer that drains `rx` until the agent drops its sender.
pub fn spawn_log_writer<S: BuildStore>(
    store: Arc<S>,
    build_id: BuildId,
    step_id: Option<StepId>,
    mut rx: mpsc::Receiver<LogChunk>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            let entry = LogEntry {
                build_id: build_id.clone(),
                step_id: step_id.clone(),
                stream: stream_of(chunk.stream),
                content: chunk.content,
            };
            if let Err(e) = store.append_log(&entry).await {
                tracing::warn!(build_id = %build_id, error = %e, "log append failed, dropping chunk");
            }
        }
    })
}
