// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build identifier and status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a build.
    ///
    /// Builds are created by the external UI and referenced by id everywhere:
    /// HTTP requests, store rows, worker environment, and log output.
    pub struct BuildId;
}

/// Status of a build.
///
/// Transitions follow a monotone lattice: once a build reaches a terminal
/// status (`Completed`, `Failed`, `Cancelled`) no further transition is
/// accepted. Status writes to the store are guarded accordingly (see
/// `bm-store`), so a late `running` write from a stale worker cannot clobber
/// a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Created, waiting for the dispatcher to pick it up
    Queued,
    /// A worker is executing the prompt queue
    Running,
    /// The worker is sleeping out a retry backoff
    Retrying,
    /// All steps succeeded
    Completed,
    /// A step failed permanently, or the worker was lost
    Failed,
    /// Cancelled by signal or status flip
    Cancelled,
}

impl BuildStatus {
    /// All terminal statuses, in store-filter order.
    pub const TERMINAL: [BuildStatus; 3] =
        [BuildStatus::Completed, BuildStatus::Failed, BuildStatus::Cancelled];

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Completed | BuildStatus::Failed | BuildStatus::Cancelled)
    }

    /// Whether the build is actively owned by a worker.
    pub fn is_active(&self) -> bool {
        matches!(self, BuildStatus::Running | BuildStatus::Retrying)
    }

    /// Whether a transition to `next` respects the status lattice.
    ///
    /// `queued → running`, `running ↔ retrying`, and any active status into a
    /// terminal one. `queued` may also be failed or cancelled directly (spawn
    /// failure, cancel before pickup).
    pub fn accepts(&self, next: BuildStatus) -> bool {
        use BuildStatus::*;
        match (*self, next) {
            (_, _) if self.is_terminal() => false,
            (Queued, Running) => true,
            (Queued, Failed) | (Queued, Cancelled) => true,
            (Running, Retrying) | (Retrying, Running) => true,
            (Running | Retrying, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

crate::simple_display! {
    BuildStatus {
        Queued => "queued",
        Running => "running",
        Retrying => "retrying",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// A `builds` row as stored externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRow {
    pub id: BuildId,
    #[serde(default)]
    pub project_id: Option<String>,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BuildRow {
    /// Milliseconds since the last heartbeat, relative to `now`.
    ///
    /// Returns `None` when the build has never heartbeated.
    pub fn heartbeat_age_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        let hb = self.last_heartbeat?;
        Some((now - hb).num_milliseconds().max(0) as u64)
    }
}

crate::builder! {
    pub struct BuildRowBuilder => BuildRow {
        into {
            id: BuildId = "build-1",
        }
        set {
            status: BuildStatus = BuildStatus::Queued,
        }
        option {
            project_id: String = Some("project-1".to_string()),
            error: String = None,
            last_heartbeat: DateTime<Utc> = None,
            created_at: DateTime<Utc> = None,
            updated_at: DateTime<Utc> = None,
        }
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
