// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::settings::RunnerSettings;
use bm_agent::{FakeAgent, ScriptedRun};
use bm_core::{BuildRow, FakeClock, RetryPolicy, StepStatus};
use bm_store::{FakeStore, LogStream};
use chrono::Utc;

fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        heartbeat_interval: Duration::from_millis(10),
        step_timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
        cancel_poll_interval: Duration::from_millis(10),
    }
}

fn seed_build(store: &FakeStore, id: &str) -> BuildId {
    let build_id = BuildId::new(id);
    store.insert_build(
        BuildRow::builder().id(id).status(BuildStatus::Queued).build(),
    );
    build_id
}

fn make_runner(
    store: &FakeStore,
    agent: &FakeAgent,
    build_id: &BuildId,
    settings: RunnerSettings,
) -> Runner<FakeStore, FakeAgent, FakeClock> {
    Runner::new(
        Arc::new(store.clone()),
        Arc::new(agent.clone()),
        FakeClock::new(),
        settings,
        build_id.clone(),
        std::env::temp_dir(),
    )
}

#[tokio::test]
async fn happy_path_three_prompts() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-happy");
    store.insert_planned(&build_id, &["P0", "P1", "P2"]);
    agent.push_successes(3);

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(agent.prompts(), vec!["P0", "P1", "P2"]);

    let steps = store.steps();
    assert_eq!(steps.len(), 3);
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.ordinal, i as u32);
        assert_eq!(step.status, StepStatus::Succeeded);
        assert_eq!(step.attempt, 1);
        assert!(step.ended_at.is_some());
    }

    let build = store.build(&build_id).unwrap();
    assert_eq!(build.status, BuildStatus::Completed);
    assert!(store.heartbeat_count(&build_id) >= 1);
}

#[tokio::test]
async fn steps_do_not_overlap() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-order");
    store.insert_planned(&build_id, &["P0", "P1"]);
    agent.push(ScriptedRun::success().delayed(Duration::from_millis(20)));
    agent.push(ScriptedRun::success().delayed(Duration::from_millis(20)));

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    runner.run().await.unwrap();

    let steps = store.steps();
    assert_eq!(steps.len(), 2);
    // Earlier step ends at or before the later step starts.
    assert!(steps[0].ended_at.unwrap() <= steps[1].started_at.unwrap());
}

#[tokio::test]
async fn transient_failure_then_success() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-transient");
    store.insert_planned(&build_id, &["P0"]);
    agent.push(ScriptedRun::transient("agent exited with code 1"));
    agent.push(ScriptedRun::success());

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Completed);
    let steps = store.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Succeeded);
    assert_eq!(steps[0].attempt, 2);

    // Stderr from the failed attempt was streamed to the log table.
    let logs = store.logs();
    assert!(logs.iter().any(|l| l.stream == LogStream::Stderr));
    assert_eq!(store.build(&build_id).unwrap().status, BuildStatus::Completed);
}

#[tokio::test]
async fn exhausted_retries_fail_the_build() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-exhausted");
    store.insert_planned(&build_id, &["P0", "P1"]);
    for _ in 0..3 {
        agent.push(ScriptedRun::transient("agent exited with code 1"));
    }

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Failed);
    assert_eq!(outcome.exit_code(), 1);

    // P1 never started.
    let steps = store.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].attempt, 3);
    assert!(steps[0].error.as_deref().unwrap().contains("after 3 attempts"));

    let build = store.build(&build_id).unwrap();
    assert_eq!(build.status, BuildStatus::Failed);
    assert!(build.error.is_some());
}

#[tokio::test]
async fn zero_retries_fail_immediately() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-noretry");
    store.insert_planned(&build_id, &["P0"]);
    agent.push(ScriptedRun::transient("flaky"));

    let mut settings = fast_settings();
    settings.retry = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(5));
    let runner = make_runner(&store, &agent, &build_id, settings);
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Failed);
    let steps = store.steps();
    assert_eq!(steps[0].attempt, 1);
    assert_eq!(steps[0].status, StepStatus::Failed);
}

#[tokio::test]
async fn fatal_outcome_skips_retries() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-fatal");
    store.insert_planned(&build_id, &["P0"]);
    agent.push(ScriptedRun::fatal("agent reported fatal error (invalid api key)"));
    agent.push(ScriptedRun::success());

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Failed);
    // Only one invocation: no retry after a fatal classification.
    assert_eq!(agent.requests().len(), 1);
    assert_eq!(store.steps()[0].attempt, 1);
}

#[tokio::test]
async fn zero_prompt_build_completes_without_steps() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-empty");
    store.insert_planned(&build_id, &[]);

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Completed);
    assert!(store.steps().is_empty());
    assert!(agent.requests().is_empty());
    assert_eq!(store.build(&build_id).unwrap().status, BuildStatus::Completed);
}

#[tokio::test]
async fn custom_prompt_runs_before_remaining_plan() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-custom");
    store.insert_planned(&build_id, &["P0", "P1"]);
    // P0 takes long enough for the injection to land mid-step.
    agent.push(ScriptedRun::success().delayed(Duration::from_millis(80)));
    agent.push_successes(2);

    let injector = {
        let store = store.clone();
        let build_id = build_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.insert_custom_prompt("cp-1", &build_id, "CP", Utc::now());
        })
    };

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();
    injector.await.unwrap();

    assert_eq!(outcome, BuildOutcome::Completed);
    assert_eq!(agent.prompts(), vec!["P0", "CP", "P1"]);

    let steps = store.steps();
    assert_eq!(steps.len(), 3);
    assert_eq!(
        steps.iter().map(|s| (s.ordinal, s.prompt.as_str())).collect::<Vec<_>>(),
        vec![(0, "P0"), (1, "CP"), (2, "P1")]
    );

    let cp = store.custom_prompt("cp-1").unwrap();
    assert_eq!(cp.status, bm_core::CustomPromptStatus::Executed);
}

#[tokio::test]
async fn custom_prompts_skipped_when_build_fails() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-skip");
    store.insert_planned(&build_id, &["P0"]);
    // The injected prompt runs first and fails fatally.
    store.insert_custom_prompt("cp-1", &build_id, "CP", Utc::now());
    agent.push(ScriptedRun::fatal("fatal: broken"));

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Failed);
    let cp = store.custom_prompt("cp-1").unwrap();
    assert_eq!(cp.status, bm_core::CustomPromptStatus::Skipped);
    // Only the custom prompt ran; the planned prompt never started.
    assert_eq!(store.steps().len(), 1);
    assert_eq!(store.steps()[0].prompt, "CP");
}

#[tokio::test]
async fn cancellation_mid_agent() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-cancel");
    store.insert_planned(&build_id, &["P0"]);
    agent.push(ScriptedRun::success().delayed(Duration::from_secs(10)));

    let canceller = {
        let store = store.clone();
        let build_id = build_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            store.force_status(&build_id, BuildStatus::Cancelled);
        })
    };

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();
    canceller.await.unwrap();

    assert_eq!(outcome, BuildOutcome::Cancelled);
    assert_eq!(outcome.exit_code(), 0);

    let steps = store.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].error.as_deref(), Some("cancelled"));
    assert_eq!(store.build(&build_id).unwrap().status, BuildStatus::Cancelled);
}

#[tokio::test]
async fn externally_failed_build_stops_worker() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-extfail");
    store.insert_planned(&build_id, &["P0", "P1"]);
    agent.push(ScriptedRun::success().delayed(Duration::from_secs(10)));

    // A restarted dispatcher reconciled this build as lost while the worker
    // was still running.
    let failer = {
        let store = store.clone();
        let build_id = build_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            store.force_status(&build_id, BuildStatus::Failed);
        })
    };

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();
    failer.await.unwrap();

    assert_eq!(outcome, BuildOutcome::Cancelled);
    // Only the in-flight step ran; P1 never started.
    assert_eq!(agent.requests().len(), 1);
    let steps = store.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Failed);
    // The externally-written status stands.
    assert_eq!(store.build(&build_id).unwrap().status, BuildStatus::Failed);
}

#[tokio::test]
async fn sigterm_style_token_cancel() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-sigterm");
    store.insert_planned(&build_id, &["P0"]);
    agent.push(ScriptedRun::success().delayed(Duration::from_secs(10)));

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let outcome = runner.run().await.unwrap();
    assert_eq!(outcome, BuildOutcome::Cancelled);
    assert_eq!(store.build(&build_id).unwrap().status, BuildStatus::Cancelled);
}

#[tokio::test]
async fn heartbeats_flow_during_long_agent_run() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-heartbeat");
    store.insert_planned(&build_id, &["P0"]);
    agent.push(ScriptedRun::success().delayed(Duration::from_millis(120)));

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    runner.run().await.unwrap();

    // 120ms run at a 10ms cadence: well over three beats even with jittery
    // scheduling.
    assert!(store.heartbeat_count(&build_id) >= 3);
    assert!(store.build(&build_id).unwrap().last_heartbeat.is_some());
}

#[tokio::test]
async fn unknown_build_is_an_error() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let runner =
        make_runner(&store, &agent, &BuildId::new("missing"), fast_settings());
    let err = runner.run().await.unwrap_err();
    assert!(matches!(err, RunnerError::BuildNotFound(_)));
}

#[tokio::test]
async fn already_terminal_build_is_a_noop() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = BuildId::new("b-done");
    store.insert_build(
        BuildRow::builder().id("b-done").status(BuildStatus::Completed).build(),
    );

    let runner = make_runner(&store, &agent, &build_id, fast_settings());
    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome, BuildOutcome::Completed);
    assert!(agent.requests().is_empty());
    assert!(store.steps().is_empty());
}

#[tokio::test]
async fn build_status_passes_through_retrying() {
    let store = FakeStore::new();
    let agent = FakeAgent::new();
    let build_id = seed_build(&store, "b-retrying");
    store.insert_planned(&build_id, &["P0"]);
    // Slow the backoff down enough to observe the retrying status.
    agent.push(ScriptedRun::transient("blip"));
    agent.push(ScriptedRun::success());

    let mut settings = fast_settings();
    settings.retry = RetryPolicy::new(2, Duration::from_millis(80), Duration::from_millis(80));

    let runner = make_runner(&store, &agent, &build_id, settings);
    let observer = {
        let store = store.clone();
        let build_id = build_id.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                if let Some(b) = store.build(&build_id) {
                    if b.status == BuildStatus::Retrying {
                        return true;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            false
        })
    };

    let outcome = runner.run().await.unwrap();
    assert_eq!(outcome, BuildOutcome::Completed);
    assert!(observer.await.unwrap(), "never observed retrying status");
    assert_eq!(store.build(&build_id).unwrap().status, BuildStatus::Completed);
}
