// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-build prompt queue and externally-injected custom prompts.
//!
//! A build starts with its planned prompts, ordinal-ordered. While the build
//! runs, the UI may insert `custom_prompts` rows; the runner observes pending
//! rows between steps and splices them ahead of the remaining planned
//! prompts (in observation order among themselves), so an injected prompt
//! steers the build as soon as the current step finishes. Step ordinals are
//! assigned in execution order at pop time, keeping them contiguous from 0.

use crate::build::BuildId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

crate::define_id! {
    /// Unique identifier for a custom prompt row.
    pub struct CustomPromptId;
}

/// Status of a custom prompt. Monotonic:
/// `pending → {injected | skipped}`, `injected → {executed | skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomPromptStatus {
    /// Inserted by the UI, not yet observed by the runner
    Pending,
    /// Spliced into a live queue
    Injected,
    /// Its step completed successfully
    Executed,
    /// The build terminated before the prompt could execute
    Skipped,
}

impl CustomPromptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CustomPromptStatus::Executed | CustomPromptStatus::Skipped)
    }

    /// Whether a transition to `next` respects the monotonic order.
    pub fn accepts(&self, next: CustomPromptStatus) -> bool {
        use CustomPromptStatus::*;
        matches!(
            (*self, next),
            (Pending, Injected) | (Pending, Skipped) | (Injected, Executed) | (Injected, Skipped)
        )
    }
}

crate::simple_display! {
    CustomPromptStatus {
        Pending => "pending",
        Injected => "injected",
        Executed => "executed",
        Skipped => "skipped",
    }
}

/// A `custom_prompts` row as stored externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPromptRow {
    pub id: CustomPromptId,
    pub build_id: BuildId,
    pub prompt: String,
    pub status: CustomPromptStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A `build_prompts` row: one planned prompt of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedPrompt {
    pub build_id: BuildId,
    pub ordinal: u32,
    pub prompt: String,
}

/// Where a queue item came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOrigin {
    /// Part of the build's planned prompt list
    Plan,
    /// Injected by the UI while the build was running
    Custom(CustomPromptId),
}

/// One dequeued prompt, carrying the step ordinal it will execute as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub ordinal: u32,
    pub prompt: String,
    pub origin: PromptOrigin,
}

/// The runner's in-memory prompt queue.
///
/// Two segments: injected custom prompts (served first, discovery order) and
/// the remaining planned prompts. Ordinals are handed out at pop time in
/// execution order.
#[derive(Debug, Default)]
pub struct PromptQueue {
    customs: VecDeque<(CustomPromptId, String)>,
    planned: VecDeque<String>,
    next_ordinal: u32,
}

impl PromptQueue {
    /// Build the initial queue from the planned prompts, ordered by their
    /// stored ordinal.
    pub fn from_planned(mut planned: Vec<PlannedPrompt>) -> Self {
        planned.sort_by_key(|p| p.ordinal);
        Self {
            customs: VecDeque::new(),
            planned: planned.into_iter().map(|p| p.prompt).collect(),
            next_ordinal: 0,
        }
    }

    /// Splice observed custom prompts into the queue.
    ///
    /// Rows are ordered by `(created_at, id)` and queued behind any custom
    /// prompts already waiting, but ahead of the remaining planned prompts.
    /// Returns the absorbed ids in queue order so the caller can mark them
    /// `injected`.
    pub fn absorb_custom(&mut self, mut rows: Vec<CustomPromptRow>) -> Vec<CustomPromptId> {
        rows.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        let mut absorbed = Vec::with_capacity(rows.len());
        for row in rows {
            absorbed.push(row.id.clone());
            self.customs.push_back((row.id, row.prompt));
        }
        absorbed
    }

    /// Pop the next prompt and assign it the next step ordinal.
    pub fn pop(&mut self) -> Option<QueueItem> {
        let (prompt, origin) = if let Some((id, prompt)) = self.customs.pop_front() {
            (prompt, PromptOrigin::Custom(id))
        } else {
            (self.planned.pop_front()?, PromptOrigin::Plan)
        };
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        Some(QueueItem { ordinal, prompt, origin })
    }

    pub fn len(&self) -> usize {
        self.customs.len() + self.planned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customs.is_empty() && self.planned.is_empty()
    }

    /// The ordinal the next popped prompt will receive.
    pub fn next_ordinal(&self) -> u32 {
        self.next_ordinal
    }
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
