// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The build state machine: queue drain, step execution, retries,
//! cancellation, and terminal bookkeeping.

use crate::error::RunnerError;
use crate::heartbeat::spawn_heartbeat;
use crate::logs::spawn_log_writer;
use crate::settings::RunnerSettings;
use bm_agent::{AgentAdapter, AgentOutcome, AgentRequest};
use bm_core::{
    BuildId, BuildStatus, Clock, CustomPromptId, CustomPromptStatus, PromptOrigin, PromptQueue,
    QueueItem, StepId, StepRow,
};
use bm_store::{BuildStore, StepPatch, StoreError};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const LOG_CHANNEL_CAPACITY: usize = 256;

/// Attempt budget for individual store writes on the critical path. Distinct
/// from the step retry policy: these cover transport flaps, not agent
/// failures.
const STORE_WRITE_ATTEMPTS: u32 = 3;
const STORE_WRITE_BACKOFF: Duration = Duration::from_millis(500);

/// Terminal result of one build execution, mapped to the worker exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl BuildOutcome {
    /// Worker process exit code: failures exit 1, everything else 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildOutcome::Failed => 1,
            BuildOutcome::Completed | BuildOutcome::Cancelled => 0,
        }
    }
}

enum StepResult {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Per-build executor. One instance drives one build to a terminal status.
pub struct Runner<S, A, C> {
    store: Arc<S>,
    agent: Arc<A>,
    clock: C,
    settings: RunnerSettings,
    build_id: BuildId,
    workspace: PathBuf,
    cancel: CancellationToken,
}

impl<S, A, C> Runner<S, A, C>
where
    S: BuildStore,
    A: AgentAdapter,
    C: Clock,
{
    pub fn new(
        store: Arc<S>,
        agent: Arc<A>,
        clock: C,
        settings: RunnerSettings,
        build_id: BuildId,
        workspace: PathBuf,
    ) -> Self {
        Self {
            store,
            agent,
            clock,
            settings,
            build_id,
            workspace,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled when the build should stop (SIGTERM or a store-side
    /// status flip). Callers wire signal handlers to this.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the build to a terminal status.
    pub async fn run(&self) -> Result<BuildOutcome, RunnerError> {
        let build = self
            .store
            .get_build(&self.build_id)
            .await?
            .ok_or_else(|| RunnerError::BuildNotFound(self.build_id.clone()))?;

        if build.status.is_terminal() {
            info!(build_id = %self.build_id, status = %build.status, "build already terminal");
            return Ok(match build.status {
                BuildStatus::Completed => BuildOutcome::Completed,
                BuildStatus::Cancelled => BuildOutcome::Cancelled,
                _ => BuildOutcome::Failed,
            });
        }

        let claimed = self
            .retry_store("claim build", || {
                let store = self.store.clone();
                let id = self.build_id.clone();
                async move { store.set_build_status(&id, BuildStatus::Running, None).await }
            })
            .await?;
        if !claimed {
            // Lost the race with a terminal write between the read above and
            // the guarded update.
            warn!(build_id = %self.build_id, "build went terminal before claim");
            return Ok(BuildOutcome::Cancelled);
        }

        let hb_stop = CancellationToken::new();
        let heartbeat = spawn_heartbeat(
            self.store.clone(),
            self.build_id.clone(),
            self.settings.heartbeat_interval,
            hb_stop.clone(),
        );
        let watch_stop = CancellationToken::new();
        let watcher = self.spawn_cancel_watcher(watch_stop.clone());

        let result = self.drive_queue().await;

        watch_stop.cancel();
        hb_stop.cancel();
        let _ = watcher.await;
        let _ = heartbeat.await;

        if let Err(e) = &result {
            // Host-level failure: record it on the build row best-effort so
            // the UI is not left with a silently stuck `running` build.
            warn!(build_id = %self.build_id, error = %e, "runner aborting on host error");
            let _ = self
                .store
                .set_build_status(&self.build_id, BuildStatus::Failed, Some(&e.to_string()))
                .await;
        }

        result
    }

    async fn drive_queue(&self) -> Result<BuildOutcome, RunnerError> {
        let planned = self.store.planned_prompts(&self.build_id).await?;
        let mut queue = PromptQueue::from_planned(planned);
        info!(build_id = %self.build_id, planned = queue.len(), "queue loaded");

        // Custom prompts marked injected but not yet executed.
        let mut outstanding: Vec<CustomPromptId> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(BuildOutcome::Cancelled, Some("cancelled"), outstanding).await;
            }

            self.absorb_pending(&mut queue, &mut outstanding).await?;

            let Some(item) = queue.pop() else { break };

            match self.execute_step(&item).await? {
                StepResult::Succeeded => {
                    if let PromptOrigin::Custom(cp) = &item.origin {
                        self.set_custom_status(cp, CustomPromptStatus::Executed).await?;
                        outstanding.retain(|o| o != cp);
                    }
                }
                StepResult::Failed(reason) => {
                    return self.finish(BuildOutcome::Failed, Some(&reason), outstanding).await;
                }
                StepResult::Cancelled => {
                    return self
                        .finish(BuildOutcome::Cancelled, Some("cancelled"), outstanding)
                        .await;
                }
            }
        }

        self.finish(BuildOutcome::Completed, None, outstanding).await
    }

    /// Observe pending custom prompts and splice them into the queue.
    async fn absorb_pending(
        &self,
        queue: &mut PromptQueue,
        outstanding: &mut Vec<CustomPromptId>,
    ) -> Result<(), RunnerError> {
        let pending = self.store.pending_custom_prompts(&self.build_id).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let absorbed = queue.absorb_custom(pending);
        for cp in &absorbed {
            self.set_custom_status(cp, CustomPromptStatus::Injected).await?;
            outstanding.push(cp.clone());
        }
        info!(build_id = %self.build_id, count = absorbed.len(), "absorbed custom prompts");
        Ok(())
    }

    /// Execute one queue item through its attempt budget.
    async fn execute_step(&self, item: &QueueItem) -> Result<StepResult, RunnerError> {
        // The step row must exist before the agent is invoked.
        let row = StepRow::start(
            self.build_id.clone(),
            item.ordinal,
            &item.prompt,
            self.clock.utc_now(),
        );
        let row = self
            .retry_store("insert step", || {
                let store = self.store.clone();
                let row = row.clone();
                async move { store.insert_step(&row).await }
            })
            .await?;
        let step_id = row.id;
        info!(build_id = %self.build_id, ordinal = item.ordinal, "step started");

        let mut attempt: u32 = 1;
        loop {
            let (log_tx, log_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
            let writer = spawn_log_writer(
                self.store.clone(),
                self.build_id.clone(),
                step_id.clone(),
                log_rx,
            );

            let req = AgentRequest {
                prompt: item.prompt.clone(),
                workspace: self.workspace.clone(),
                timeout: self.settings.step_timeout,
            };
            let run = self.agent.run(req, log_tx, &self.cancel).await?;
            let _ = writer.await;

            match run.outcome {
                AgentOutcome::Success => {
                    self.update_step(&step_id, StepPatch::succeeded(self.clock.utc_now())).await?;
                    info!(build_id = %self.build_id, ordinal = item.ordinal, attempt, "step succeeded");
                    return Ok(StepResult::Succeeded);
                }
                AgentOutcome::Cancelled => {
                    self.update_step(
                        &step_id,
                        StepPatch::failed(self.clock.utc_now(), "cancelled"),
                    )
                    .await?;
                    return Ok(StepResult::Cancelled);
                }
                AgentOutcome::Fatal(reason) => {
                    self.update_step(
                        &step_id,
                        StepPatch::failed(self.clock.utc_now(), reason.as_str()),
                    )
                    .await?;
                    warn!(build_id = %self.build_id, ordinal = item.ordinal, %reason, "step failed (fatal)");
                    return Ok(StepResult::Failed(reason));
                }
                AgentOutcome::Transient(reason) => {
                    if !self.settings.retry.attempts_remaining(attempt) {
                        let message = format!("{reason} (after {attempt} attempts)");
                        self.update_step(
                            &step_id,
                            StepPatch::failed(self.clock.utc_now(), message.as_str()),
                        )
                        .await?;
                        warn!(build_id = %self.build_id, ordinal = item.ordinal, %reason, attempt, "step failed (retries exhausted)");
                        return Ok(StepResult::Failed(message));
                    }

                    self.update_step(&step_id, StepPatch::retrying(attempt, reason.as_str()))
                        .await?;
                    self.set_build_status(BuildStatus::Retrying).await?;
                    let backoff = self.settings.retry.jittered_backoff(attempt);
                    info!(
                        build_id = %self.build_id,
                        ordinal = item.ordinal,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        %reason,
                        "transient step failure, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => {
                            self.update_step(
                                &step_id,
                                StepPatch::failed(self.clock.utc_now(), "cancelled"),
                            )
                            .await?;
                            return Ok(StepResult::Cancelled);
                        }
                    }
                    attempt += 1;
                    self.update_step(&step_id, StepPatch::running(attempt)).await?;
                    self.set_build_status(BuildStatus::Running).await?;
                }
            }
        }
    }

    /// Record the terminal status and resolve every custom prompt that never
    /// executed.
    async fn finish(
        &self,
        outcome: BuildOutcome,
        error: Option<&str>,
        outstanding: Vec<CustomPromptId>,
    ) -> Result<BuildOutcome, RunnerError> {
        // Injected-but-unexecuted prompts first, then anything still pending
        // in the store (arrived after the last absorb).
        for cp in outstanding {
            if let Err(e) = self
                .store
                .set_custom_prompt_status(&cp, CustomPromptStatus::Skipped)
                .await
            {
                warn!(build_id = %self.build_id, custom_prompt = %cp, error = %e, "failed to skip custom prompt");
            }
        }
        match self.store.pending_custom_prompts(&self.build_id).await {
            Ok(rows) => {
                for row in rows {
                    if let Err(e) = self
                        .store
                        .set_custom_prompt_status(&row.id, CustomPromptStatus::Skipped)
                        .await
                    {
                        warn!(build_id = %self.build_id, custom_prompt = %row.id, error = %e, "failed to skip custom prompt");
                    }
                }
            }
            Err(e) => {
                warn!(build_id = %self.build_id, error = %e, "failed to list pending custom prompts at finish");
            }
        }

        let status = match outcome {
            BuildOutcome::Completed => BuildStatus::Completed,
            BuildOutcome::Failed => BuildStatus::Failed,
            BuildOutcome::Cancelled => BuildStatus::Cancelled,
        };
        let matched = self
            .retry_store("finish build", || {
                let store = self.store.clone();
                let id = self.build_id.clone();
                let error = error.map(str::to_string);
                async move { store.set_build_status(&id, status, error.as_deref()).await }
            })
            .await?;
        if !matched {
            // Someone else (UI cancel, reaper) got there first; their status
            // stands.
            info!(build_id = %self.build_id, status = %status, "terminal status already written");
        }
        info!(build_id = %self.build_id, status = %status, "build finished");
        Ok(outcome)
    }

    fn spawn_cancel_watcher(&self, stop: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let build_id = self.build_id.clone();
        let cancel = self.cancel.clone();
        let every = self.settings.cancel_poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.get_build(&build_id).await {
                            // The row can also go terminal under us: a UI
                            // cancel, or a restarted dispatcher reconciling
                            // this build as lost. Stop work either way; the
                            // guarded finish write leaves the external
                            // status standing.
                            Ok(Some(build)) if build.status.is_terminal() => {
                                info!(build_id = %build_id, status = %build.status, "terminal status observed in store");
                                cancel.cancel();
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!(build_id = %build_id, error = %e, "cancel poll failed");
                            }
                        }
                    }
                }
            }
        })
    }

    async fn update_step(
        &self,
        step_id: &Option<StepId>,
        patch: StepPatch,
    ) -> Result<(), RunnerError> {
        let Some(step_id) = step_id else {
            // Store did not return the inserted row's id; nothing to update.
            warn!(build_id = %self.build_id, "step update skipped, no step id");
            return Ok(());
        };
        self.retry_store("update step", || {
            let store = self.store.clone();
            let id = step_id.clone();
            let patch = patch.clone();
            async move { store.update_step(&id, &patch).await }
        })
        .await?;
        Ok(())
    }

    async fn set_build_status(&self, status: BuildStatus) -> Result<(), RunnerError> {
        self.retry_store("set build status", || {
            let store = self.store.clone();
            let id = self.build_id.clone();
            async move { store.set_build_status(&id, status, None).await }
        })
        .await?;
        Ok(())
    }

    async fn set_custom_status(
        &self,
        id: &CustomPromptId,
        status: CustomPromptStatus,
    ) -> Result<(), RunnerError> {
        self.retry_store("set custom prompt status", || {
            let store = self.store.clone();
            let id = id.clone();
            async move { store.set_custom_prompt_status(&id, status).await }
        })
        .await?;
        Ok(())
    }

    /// Retry a store operation through transport flaps.
    async fn retry_store<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < STORE_WRITE_ATTEMPTS => {
                    warn!(build_id = %self.build_id, %what, attempt, error = %e, "transient store error, retrying");
                    tokio::time::sleep(STORE_WRITE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
