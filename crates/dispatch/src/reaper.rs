// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic cleanup: dead workers, heartbeat-stale builds, leaked ports.

use crate::preview::PreviewManager;
use crate::registry::Registry;
use bm_agent::{kill_by_pid, pid_alive};
use bm_core::{BuildId, BuildStatus};
use bm_store::BuildStore;
use chrono::Utc;
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One reaper pass.
///
/// 1. Registry entries whose worker pid is gone are dropped (their exit watch
///    was missed, e.g. across restarts).
/// 2. Store builds in `running`/`retrying` whose `last_heartbeat` is older
///    than the liveness threshold are marked `failed` with reason
///    `lost_worker`; a still-present worker gets a SIGTERM.
/// 3. Previews whose process is gone give their port back.
pub async fn reap_once<S: BuildStore>(
    registry: &Registry,
    preview: &PreviewManager,
    store: &Arc<S>,
    heartbeat_timeout: Duration,
) {
    // (1) dead workers
    for entry in registry.list() {
        let Some(pid) = entry.pid else { continue };
        if !pid_alive(pid) {
            warn!(build_id = %entry.build_id, pid, "reaping entry for dead worker");
            registry.remove(&entry.build_id);
        }
    }

    // (2) stale heartbeats
    match store.active_builds().await {
        Ok(builds) => {
            let now = Utc::now();
            let threshold = heartbeat_timeout.as_millis() as u64;
            for build in builds {
                // A running build that has never heartbeated is as lost as
                // one that stopped.
                let age = build.heartbeat_age_ms(now).unwrap_or(u64::MAX);
                if age <= threshold {
                    continue;
                }
                warn!(build_id = %build.id, age_ms = age, "heartbeat stale, marking build failed");
                if let Err(e) = store
                    .set_build_status(&build.id, BuildStatus::Failed, Some("lost_worker"))
                    .await
                {
                    warn!(build_id = %build.id, error = %e, "failed to mark lost build");
                    continue;
                }
                reap_entry(registry, &build.id);
            }
        }
        Err(e) => {
            warn!(error = %e, "reaper could not list active builds");
        }
    }

    // (3) leaked ports
    let released = preview.reap_orphans();
    if !released.is_empty() {
        info!(ports = ?released, "reaper released orphaned preview ports");
    }
}

fn reap_entry(registry: &Registry, build_id: &BuildId) {
    if let Some(entry) = registry.remove(build_id) {
        if let Some(pid) = entry.pid {
            if pid_alive(pid) {
                // Worker still exists but stopped heartbeating; tell it to go.
                warn!(build_id = %build_id, pid, "terminating unresponsive worker");
                kill_by_pid(pid, Signal::SIGTERM);
            }
        }
    }
}

/// Spawn the periodic reaper task.
pub fn spawn_reaper<S: BuildStore>(
    registry: Registry,
    preview: PreviewManager,
    store: Arc<S>,
    heartbeat_timeout: Duration,
    every: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The interval's first tick is immediate; skip it so startup
        // reconciliation (which already ran) is not doubled.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    reap_once(&registry, &preview, &store, heartbeat_timeout).await;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
