// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bm_agent::PreviewCommand;
use bm_core::BuildRow;
use bm_store::FakeStore;

async fn dead_pid() -> u32 {
    let mut child = tokio::process::Command::new("true").spawn().unwrap();
    let pid = child.id().unwrap();
    let _ = child.wait().await;
    pid
}

fn manager() -> PreviewManager {
    PreviewManager::new(3100..=3102, PreviewCommand::parse(Some("sleep 30")))
}

#[tokio::test]
async fn drops_entries_for_dead_workers() {
    let registry = Registry::new(5);
    let preview = manager();
    let store = Arc::new(FakeStore::new());

    let live = BuildId::new("b-live");
    registry.try_register(&live).unwrap();
    registry.set_pid(&live, std::process::id());

    let dead = BuildId::new("b-dead");
    registry.try_register(&dead).unwrap();
    registry.set_pid(&dead, dead_pid().await);

    reap_once(&registry, &preview, &store, Duration::from_secs(60)).await;

    assert!(registry.contains(&live));
    assert!(!registry.contains(&dead));
}

#[tokio::test]
async fn marks_heartbeat_stale_builds_failed() {
    let registry = Registry::new(5);
    let preview = manager();
    let store = Arc::new(FakeStore::new());

    let stale_hb = Utc::now() - chrono::Duration::seconds(120);
    store.insert_build(
        BuildRow::builder()
            .id("b-stale")
            .status(BuildStatus::Running)
            .last_heartbeat(stale_hb)
            .build(),
    );
    store.insert_build(
        BuildRow::builder()
            .id("b-fresh")
            .status(BuildStatus::Running)
            .last_heartbeat(Utc::now())
            .build(),
    );
    // Running but never heartbeated at all
    store.insert_build(
        BuildRow::builder().id("b-silent").status(BuildStatus::Running).build(),
    );

    reap_once(&registry, &preview, &store, Duration::from_secs(60)).await;

    let stale = store.build(&BuildId::new("b-stale")).unwrap();
    assert_eq!(stale.status, BuildStatus::Failed);
    assert_eq!(stale.error.as_deref(), Some("lost_worker"));

    let silent = store.build(&BuildId::new("b-silent")).unwrap();
    assert_eq!(silent.status, BuildStatus::Failed);

    let fresh = store.build(&BuildId::new("b-fresh")).unwrap();
    assert_eq!(fresh.status, BuildStatus::Running);
}

#[tokio::test]
async fn stale_build_entry_is_removed_from_registry() {
    let registry = Registry::new(5);
    let preview = manager();
    let store = Arc::new(FakeStore::new());

    let id = BuildId::new("b-stale");
    store.insert_build(
        BuildRow::builder()
            .id("b-stale")
            .status(BuildStatus::Retrying)
            .last_heartbeat(Utc::now() - chrono::Duration::seconds(300))
            .build(),
    );
    registry.try_register(&id).unwrap();
    registry.set_pid(&id, dead_pid().await);

    reap_once(&registry, &preview, &store, Duration::from_secs(60)).await;

    assert!(!registry.contains(&id));
    assert_eq!(store.build(&id).unwrap().status, BuildStatus::Failed);
}

#[tokio::test]
async fn terminal_builds_are_left_alone() {
    let registry = Registry::new(5);
    let preview = manager();
    let store = Arc::new(FakeStore::new());

    store.insert_build(
        BuildRow::builder().id("b-done").status(BuildStatus::Completed).build(),
    );

    reap_once(&registry, &preview, &store, Duration::from_secs(60)).await;

    assert_eq!(store.build(&BuildId::new("b-done")).unwrap().status, BuildStatus::Completed);
}
