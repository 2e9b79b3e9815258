// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process spawning.
//!
//! One fresh OS process per build. The build id and store credentials travel
//! exclusively through environment variables; the child gets null stdin and
//! inherits only the standard output streams.

use crate::http::StartCreds;
use crate::preview::PreviewManager;
use crate::registry::Registry;
use async_trait::async_trait;
use bm_core::BuildId;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{info, warn};

/// Spawns a worker for a registered build and watches its exit.
#[async_trait]
pub trait WorkerSpawner: Send + Sync + 'static {
    /// Spawn a worker; returns its pid.
    async fn spawn(&self, build_id: &BuildId, creds: &StartCreds) -> std::io::Result<u32>;
}

/// Real spawner: forks the `bm-worker` binary.
pub struct ProcessSpawner {
    worker_bin: PathBuf,
    registry: Registry,
    preview: PreviewManager,
}

impl ProcessSpawner {
    pub fn new(worker_bin: PathBuf, registry: Registry, preview: PreviewManager) -> Self {
        Self { worker_bin, registry, preview }
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, build_id: &BuildId, creds: &StartCreds) -> std::io::Result<u32> {
        let mut cmd = tokio::process::Command::new(&self.worker_bin);
        cmd.env("BUILD_ID", build_id.as_str())
            .env("STORE_URL", &creds.store_url)
            .env("STORE_ANON_KEY", &creds.anon_key)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            // Workers die with the dispatcher. Startup reconciliation fails
            // every store-active build on the assumption that no worker
            // survived the previous instance.
            .kill_on_drop(true);
        if let Some(service_key) = &creds.service_key {
            cmd.env("STORE_SERVICE_KEY", service_key);
        }
        if let Some(access_token) = &creds.access_token {
            cmd.env("STORE_ACCESS_TOKEN", access_token);
        }

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("worker exited before pid observation"))?;
        info!(build_id = %build_id, pid, "worker spawned");

        // Non-blocking exit watch: drop the registry entry and any preview
        // the build still holds.
        let registry = self.registry.clone();
        let preview = self.preview.clone();
        let watch_id = build_id.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let code = status.as_ref().ok().and_then(|s| s.code());
            info!(build_id = %watch_id, pid, exit_code = ?code, "worker exited");
            registry.remove(&watch_id);
            match preview.stop(&watch_id).await {
                Ok(()) => {}
                Err(crate::preview::PreviewError::NotFound) => {}
                Err(e) => {
                    warn!(build_id = %watch_id, error = %e, "preview cleanup after worker exit failed");
                }
            }
        });

        Ok(pid)
    }
}
