// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`BuildStore`] trait: everything the runner and dispatcher need from
//! the external store, narrowed to table-level reads and guarded writes.

use crate::error::StoreError;
use async_trait::async_trait;
use bm_core::{
    BuildId, BuildRow, BuildStatus, CustomPromptId, CustomPromptRow, CustomPromptStatus,
    PlannedPrompt, StepId, StepRow, StepStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stream a log row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

bm_core::simple_display! {
    LogStream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// One append-only `build_logs` row.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub build_id: BuildId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub stream: LogStream,
    pub content: String,
}

/// Partial update for a `steps` row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepPatch {
    /// Attempt `n` back in flight after a retry backoff.
    pub fn running(attempt: u32) -> Self {
        Self { status: Some(StepStatus::Running), attempt: Some(attempt), ..Self::default() }
    }

    /// Sleeping out backoff after a transient failure on `attempt`.
    pub fn retrying(attempt: u32, error: impl Into<String>) -> Self {
        Self {
            status: Some(StepStatus::Retrying),
            attempt: Some(attempt),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn succeeded(ended_at: DateTime<Utc>) -> Self {
        Self { status: Some(StepStatus::Succeeded), ended_at: Some(ended_at), ..Self::default() }
    }

    pub fn failed(ended_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: Some(StepStatus::Failed),
            ended_at: Some(ended_at),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Table-level access to the external store.
///
/// Implemented by [`crate::StoreClient`] over REST and by
/// [`crate::FakeStore`] in-memory for tests.
#[async_trait]
pub trait BuildStore: Send + Sync + 'static {
    /// Fetch a build row by id.
    async fn get_build(&self, id: &BuildId) -> Result<Option<BuildRow>, StoreError>;

    /// Guarded status write: only applied while the stored status is
    /// non-terminal. Returns whether a row matched the guard.
    async fn set_build_status(
        &self,
        id: &BuildId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Write `last_heartbeat = now`. Last-write-wins, unguarded.
    async fn heartbeat(&self, id: &BuildId) -> Result<(), StoreError>;

    /// The build's planned prompts, ordinal-ordered.
    async fn planned_prompts(&self, id: &BuildId) -> Result<Vec<PlannedPrompt>, StoreError>;

    /// Insert a step row; returns the row as stored (with its assigned id).
    async fn insert_step(&self, row: &StepRow) -> Result<StepRow, StoreError>;

    /// Update a step row in place.
    async fn update_step(&self, id: &StepId, patch: &StepPatch) -> Result<(), StoreError>;

    /// Append one log row.
    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError>;

    /// Custom prompts for the build still in `pending`, oldest first
    /// (tie-break by id).
    async fn pending_custom_prompts(
        &self,
        id: &BuildId,
    ) -> Result<Vec<CustomPromptRow>, StoreError>;

    /// Transition a custom prompt's status.
    async fn set_custom_prompt_status(
        &self,
        id: &CustomPromptId,
        status: CustomPromptStatus,
    ) -> Result<(), StoreError>;

    /// All builds currently in `running` or `retrying`.
    async fn active_builds(&self) -> Result<Vec<BuildRow>, StoreError>;

    /// The build's in-flight step (status `running` or `retrying`), if any.
    async fn in_flight_step(&self, id: &BuildId) -> Result<Option<StepRow>, StoreError>;
}
