// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview manager: one dev-server child per built project, bound to a port
//! from the pool.
//!
//! Entry removal is the single release point for a port: whichever routine
//! takes the entry out of the map (stop, the per-child watcher, or the
//! reaper) returns the port, so a port can never be double-freed.

use crate::ports::PortPool;
use bm_agent::{kill_by_pid, pid_alive, PreviewCommand, PREVIEW_KILL_GRACE};
use bm_core::BuildId;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// A live dev server.
#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub build_id: BuildId,
    pub pid: u32,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("no preview for this build")]
    NotFound,

    #[error("preview already running")]
    AlreadyRunning,

    #[error("preview port pool exhausted")]
    NoPortsAvailable,

    #[error("failed to spawn dev server: {0}")]
    Spawn(std::io::Error),
}

struct Inner {
    pool: Mutex<PortPool>,
    entries: Mutex<HashMap<BuildId, PreviewEntry>>,
    command: PreviewCommand,
}

/// Starts and stops preview dev servers.
#[derive(Clone)]
pub struct PreviewManager {
    inner: Arc<Inner>,
}

impl PreviewManager {
    pub fn new(range: RangeInclusive<u16>, command: PreviewCommand) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool: Mutex::new(PortPool::new(range)),
                entries: Mutex::new(HashMap::new()),
                command,
            }),
        }
    }

    /// Start a dev server for the build's workspace.
    ///
    /// The entries lock is held across the (synchronous) spawn so two
    /// concurrent starts for one build cannot both pass the existence check.
    pub fn start(
        &self,
        build_id: &BuildId,
        workspace: &Path,
    ) -> Result<PreviewEntry, PreviewError> {
        let mut entries = self.inner.entries.lock();
        if entries.contains_key(build_id) {
            return Err(PreviewError::AlreadyRunning);
        }

        let port = self.inner.pool.lock().allocate().ok_or(PreviewError::NoPortsAvailable)?;

        let mut child = match self.inner.command.spawn(port, workspace) {
            Ok(child) => child,
            Err(e) => {
                self.inner.pool.lock().release(port);
                return Err(PreviewError::Spawn(e));
            }
        };
        let Some(pid) = child.id() else {
            // Exited before we could observe the pid
            self.inner.pool.lock().release(port);
            return Err(PreviewError::Spawn(std::io::Error::other("dev server exited at spawn")));
        };

        let entry =
            PreviewEntry { build_id: build_id.clone(), pid, port, started_at: Utc::now() };
        entries.insert(build_id.clone(), entry.clone());
        drop(entries);
        info!(build_id = %build_id, pid, port, "preview started");

        // Watcher: reclaim the port when the child exits on its own.
        let inner = Arc::clone(&self.inner);
        let watch_id = build_id.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let removed = {
                let mut entries = inner.entries.lock();
                match entries.get(&watch_id) {
                    Some(current) if current.pid == pid => entries.remove(&watch_id),
                    _ => None,
                }
            };
            if let Some(entry) = removed {
                inner.pool.lock().release(entry.port);
                warn!(
                    build_id = %watch_id,
                    pid,
                    port = entry.port,
                    status = ?status.ok(),
                    "preview exited, port released"
                );
            }
        });

        Ok(entry)
    }

    /// Stop a running preview: SIGTERM, bounded grace, SIGKILL.
    pub async fn stop(&self, build_id: &BuildId) -> Result<(), PreviewError> {
        let entry =
            self.inner.entries.lock().remove(build_id).ok_or(PreviewError::NotFound)?;

        kill_by_pid(entry.pid, Signal::SIGTERM);
        let deadline = tokio::time::Instant::now() + PREVIEW_KILL_GRACE;
        while pid_alive(entry.pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if pid_alive(entry.pid) {
            warn!(build_id = %build_id, pid = entry.pid, "preview ignored SIGTERM, killing");
            kill_by_pid(entry.pid, Signal::SIGKILL);
        }

        self.inner.pool.lock().release(entry.port);
        info!(build_id = %build_id, port = entry.port, "preview stopped");
        Ok(())
    }

    /// All live previews.
    pub fn list(&self) -> Vec<PreviewEntry> {
        let mut entries: Vec<PreviewEntry> =
            self.inner.entries.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.port);
        entries
    }

    pub fn entry(&self, build_id: &BuildId) -> Option<PreviewEntry> {
        self.inner.entries.lock().get(build_id).cloned()
    }

    /// Drop entries whose process is gone and return their ports to the
    /// pool. Covers exits the per-child watcher missed (e.g. dispatcher
    /// restart).
    pub fn reap_orphans(&self) -> Vec<u16> {
        let dead: Vec<PreviewEntry> = {
            let entries = self.inner.entries.lock();
            entries.values().filter(|e| !pid_alive(e.pid)).cloned().collect()
        };
        let mut released = Vec::new();
        for entry in dead {
            let removed = self.inner.entries.lock().remove(&entry.build_id);
            if let Some(entry) = removed {
                self.inner.pool.lock().release(entry.port);
                warn!(build_id = %entry.build_id, port = entry.port, "reaped dead preview");
                released.push(entry.port);
            }
        }
        released
    }

    pub fn allocated_ports(&self) -> usize {
        self.inner.pool.lock().allocated_count()
    }
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
