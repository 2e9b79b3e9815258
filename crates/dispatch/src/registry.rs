// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory registry of active builds.
//!
//! The registry is a cache over the store, not a source of truth: it exists
//! so the dispatcher can enforce the concurrency cap and answer listings
//! without a store round-trip. Entries are created when a start request is
//! accepted and removed when the worker exits or the reaper collects it.

use bm_core::BuildId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// One active build tracked by the dispatcher.
#[derive(Debug, Clone)]
pub struct ActiveBuild {
    pub build_id: BuildId,
    /// Worker pid; `None` between registration and spawn completion.
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    /// Ordinal of the step currently in flight, refreshed opportunistically.
    pub current_step: Option<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// Concurrency cap reached; the client should retry later.
    #[error("concurrency cap reached")]
    Busy,
    /// The build already has an entry (idempotent start).
    #[error("build already active")]
    AlreadyActive,
}

/// Cap-enforcing map of active builds.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<BuildId, ActiveBuild>>>,
    cap: usize,
}

impl Registry {
    pub fn new(cap: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), cap }
    }

    /// Atomically check the cap and create an entry with no pid.
    pub fn try_register(&self, build_id: &BuildId) -> Result<(), RegisterError> {
        let mut inner = self.inner.lock();
        if inner.contains_key(build_id) {
            return Err(RegisterError::AlreadyActive);
        }
        if inner.len() >= self.cap {
            return Err(RegisterError::Busy);
        }
        inner.insert(
            build_id.clone(),
            ActiveBuild {
                build_id: build_id.clone(),
                pid: None,
                started_at: Utc::now(),
                current_step: None,
            },
        );
        Ok(())
    }

    /// Record the spawned worker's pid.
    pub fn set_pid(&self, build_id: &BuildId, pid: u32) {
        if let Some(entry) = self.inner.lock().get_mut(build_id) {
            entry.pid = Some(pid);
        }
    }

    /// Refresh the cached current-step ordinal.
    pub fn set_current_step(&self, build_id: &BuildId, ordinal: Option<u32>) {
        if let Some(entry) = self.inner.lock().get_mut(build_id) {
            entry.current_step = ordinal;
        }
    }

    pub fn remove(&self, build_id: &BuildId) -> Option<ActiveBuild> {
        self.inner.lock().remove(build_id)
    }

    pub fn contains(&self, build_id: &BuildId) -> bool {
        self.inner.lock().contains_key(build_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Snapshot of all entries, ordered by start time.
    pub fn list(&self) -> Vec<ActiveBuild> {
        let mut entries: Vec<ActiveBuild> = self.inner.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.started_at);
        entries
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
