// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness heartbeat task.
//!
//! Runs independently of step execution so heartbeats keep flowing during
//! agent invocations, backoff sleeps, and store writes. Write failures are
//! logged and skipped; the reaper only acts after several missed beats.

use bm_core::BuildId;
use bm_store::BuildStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn the heartbeat loop. The first beat fires immediately; the task runs
/// until `stop` is cancelled.
pub fn spawn_heartbeat<S: BuildStore>(
    store: Arc<S>,
    build_id: BuildId,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = store.heartbeat(&build_id).await {
                        tracing::warn!(build_id = %build_id, error = %e, "heartbeat write failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
