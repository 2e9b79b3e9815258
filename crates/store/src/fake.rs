// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`BuildStore`] for tests.
//!
//! Backs the runner/dispatcher test suites: no network, immediate responses,
//! and snapshot accessors over every table. Status writes enforce the same
//! guards the REST client relies on, and custom-prompt transitions assert
//! monotonicity so an out-of-order write fails the test that caused it.

use crate::api::{BuildStore, LogEntry, StepPatch};
use crate::error::StoreError;
use async_trait::async_trait;
use bm_core::{
    BuildId, BuildRow, BuildStatus, CustomPromptId, CustomPromptRow, CustomPromptStatus,
    PlannedPrompt, StepId, StepRow,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    builds: HashMap<BuildId, BuildRow>,
    planned: HashMap<BuildId, Vec<PlannedPrompt>>,
    steps: Vec<StepRow>,
    customs: Vec<CustomPromptRow>,
    logs: Vec<LogEntry>,
    heartbeats: HashMap<BuildId, u32>,
}

/// In-memory store double.
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<Mutex<Inner>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a build row.
    pub fn insert_build(&self, row: BuildRow) {
        self.inner.lock().builds.insert(row.id.clone(), row);
    }

    /// Seed the planned prompt list for a build, ordinals 0..n.
    pub fn insert_planned(&self, build_id: &BuildId, prompts: &[&str]) {
        let rows = prompts
            .iter()
            .enumerate()
            .map(|(i, p)| PlannedPrompt {
                build_id: build_id.clone(),
                ordinal: i as u32,
                prompt: p.to_string(),
            })
            .collect();
        self.inner.lock().planned.insert(build_id.clone(), rows);
    }

    /// Seed a pending custom prompt.
    pub fn insert_custom_prompt(
        &self,
        id: &str,
        build_id: &BuildId,
        prompt: &str,
        created_at: DateTime<Utc>,
    ) {
        self.inner.lock().customs.push(CustomPromptRow {
            id: CustomPromptId::new(id),
            build_id: build_id.clone(),
            prompt: prompt.to_string(),
            status: CustomPromptStatus::Pending,
            created_at: Some(created_at),
        });
    }

    /// Flip a build status directly, bypassing the terminal guard.
    ///
    /// Stands in for the external UI (e.g. flipping a build to `cancelled`
    /// while the worker runs).
    pub fn force_status(&self, id: &BuildId, status: BuildStatus) {
        if let Some(row) = self.inner.lock().builds.get_mut(id) {
            row.status = status;
        }
    }

    pub fn build(&self, id: &BuildId) -> Option<BuildRow> {
        self.inner.lock().builds.get(id).cloned()
    }

    pub fn steps(&self) -> Vec<StepRow> {
        let mut steps = self.inner.lock().steps.clone();
        steps.sort_by_key(|s| s.ordinal);
        steps
    }

    pub fn custom_prompt(&self, id: &str) -> Option<CustomPromptRow> {
        self.inner.lock().customs.iter().find(|c| c.id == *id).cloned()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.lock().logs.clone()
    }

    pub fn heartbeat_count(&self, id: &BuildId) -> u32 {
        self.inner.lock().heartbeats.get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BuildStore for FakeStore {
    async fn get_build(&self, id: &BuildId) -> Result<Option<BuildRow>, StoreError> {
        Ok(self.inner.lock().builds.get(id).cloned())
    }

    async fn set_build_status(
        &self,
        id: &BuildId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.builds.get_mut(id) {
            Some(row) if !row.status.is_terminal() => {
                row.status = status;
                row.updated_at = Some(Utc::now());
                if let Some(error) = error {
                    row.error = Some(error.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn heartbeat(&self, id: &BuildId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        *inner.heartbeats.entry(id.clone()).or_insert(0) += 1;
        if let Some(row) = inner.builds.get_mut(id) {
            row.last_heartbeat = Some(Utc::now());
        }
        Ok(())
    }

    async fn planned_prompts(&self, id: &BuildId) -> Result<Vec<PlannedPrompt>, StoreError> {
        Ok(self.inner.lock().planned.get(id).cloned().unwrap_or_default())
    }

    async fn insert_step(&self, row: &StepRow) -> Result<StepRow, StoreError> {
        let mut stored = row.clone();
        stored.id = Some(StepId::generate());
        self.inner.lock().steps.push(stored.clone());
        Ok(stored)
    }

    async fn update_step(&self, id: &StepId, patch: &StepPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id.as_ref() == Some(id)) else {
            return Err(StoreError::Status { status: 404, body: format!("no step {id}") });
        };
        if let Some(status) = patch.status {
            step.status = status;
        }
        if let Some(attempt) = patch.attempt {
            step.attempt = attempt;
        }
        if let Some(ended_at) = patch.ended_at {
            step.ended_at = Some(ended_at);
        }
        if let Some(error) = &patch.error {
            step.error = Some(error.clone());
        }
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        self.inner.lock().logs.push(entry.clone());
        Ok(())
    }

    async fn pending_custom_prompts(
        &self,
        id: &BuildId,
    ) -> Result<Vec<CustomPromptRow>, StoreError> {
        let mut rows: Vec<CustomPromptRow> = self
            .inner
            .lock()
            .customs
            .iter()
            .filter(|c| c.build_id == *id && c.status == CustomPromptStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(rows)
    }

    async fn set_custom_prompt_status(
        &self,
        id: &CustomPromptId,
        status: CustomPromptStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(row) = inner.customs.iter_mut().find(|c| c.id == *id) else {
            return Err(StoreError::Status { status: 404, body: format!("no custom prompt {id}") });
        };
        assert!(
            row.status.accepts(status),
            "non-monotonic custom prompt transition: {} -> {}",
            row.status,
            status
        );
        row.status = status;
        Ok(())
    }

    async fn active_builds(&self) -> Result<Vec<BuildRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .builds
            .values()
            .filter(|b| b.status.is_active())
            .cloned()
            .collect())
    }

    async fn in_flight_step(&self, id: &BuildId) -> Result<Option<StepRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .steps
            .iter()
            .filter(|s| s.build_id == *id && s.status.is_in_flight())
            .max_by_key(|s| s.ordinal)
            .cloned())
    }
}
