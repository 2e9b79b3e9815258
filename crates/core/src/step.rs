// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step rows: the persisted record of one attempt-sequence for one prompt.

use crate::build::BuildId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a step row (assigned by the store on insert).
    pub struct StepId;
}

/// Status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Pulled from the queue, row not yet running
    Pending,
    /// Agent invocation in flight
    Running,
    /// Sleeping out backoff between attempts
    Retrying,
    /// Agent exited cleanly
    Succeeded,
    /// Attempts exhausted or fatal agent output
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed)
    }

    /// Whether the step currently holds the build's single execution slot.
    ///
    /// At most one step per build may be in such a status at any time.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::Retrying)
    }
}

crate::simple_display! {
    StepStatus {
        Pending => "pending",
        Running => "running",
        Retrying => "retrying",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

/// A `steps` row as stored externally.
///
/// Ordinals are contiguous from 0 within a build; the row is created with
/// status `running` before the agent is invoked and updated in place across
/// attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRow {
    /// Assigned by the store; `None` until the insert returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StepId>,
    pub build_id: BuildId,
    pub ordinal: u32,
    pub prompt: String,
    pub status: StepStatus,
    pub attempt: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRow {
    /// Create the initial row for a queue item, attempt 1, status `running`.
    pub fn start(
        build_id: BuildId,
        ordinal: u32,
        prompt: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            build_id,
            ordinal,
            prompt: prompt.into(),
            status: StepStatus::Running,
            attempt: 1,
            started_at: Some(started_at),
            ended_at: None,
            error: None,
        }
    }
}

crate::builder! {
    pub struct StepRowBuilder => StepRow {
        into {
            build_id: BuildId = "build-1",
            prompt: String = "add a login page",
        }
        set {
            ordinal: u32 = 0,
            status: StepStatus = StepStatus::Running,
            attempt: u32 = 1,
        }
        option {
            id: StepId = Some(StepId::new("step-1")),
            started_at: DateTime<Utc> = None,
            ended_at: DateTime<Utc> = None,
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
