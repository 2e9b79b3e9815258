// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buildmill Dispatcher (bmd)
//!
//! Long-lived host process: accepts build-start requests over HTTP, spawns
//! one worker per build under a global concurrency cap, serves observability
//! endpoints, controls preview dev servers, and reaps whatever crashes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use bm_core::BuildStatus;
use bm_dispatch::{
    env, router, spawn_reaper, AppState, PreviewManager, ProcessSpawner, Registry,
};
use bm_store::{BuildStore, StoreClient, StoreConfig};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Fail fast on missing configuration, before binding anything.
    let store_config = StoreConfig::from_env()
        .ok_or("missing required environment variables STORE_URL / STORE_ANON_KEY")?;
    if std::env::var("MCP_AGENT_CMD").ok().filter(|s| !s.is_empty()).is_none() {
        return Err("missing required environment variable MCP_AGENT_CMD".into());
    }

    let store = Arc::new(StoreClient::new(store_config)?);
    let registry = Registry::new(env::max_concurrent_builds());
    let preview = PreviewManager::new(env::preview_port_range(), env::preview_command());
    let spawner = Arc::new(ProcessSpawner::new(
        env::worker_bin(),
        registry.clone(),
        preview.clone(),
    ));

    // The in-memory registry is a cache: after a restart, any build the
    // store still thinks is running has no worker and gets failed now
    // rather than after a heartbeat timeout.
    reconcile_startup(&store).await;

    let state = AppState {
        registry: registry.clone(),
        preview: preview.clone(),
        store: Arc::clone(&store),
        spawner,
        api_key: env::api_key(),
        workspace_root: env::workspace_root(),
        started_at: Instant::now(),
    };

    let reaper_stop = CancellationToken::new();
    let reaper = spawn_reaper(
        registry,
        preview,
        Arc::clone(&store),
        env::heartbeat_timeout(),
        env::reaper_interval(),
        reaper_stop.clone(),
    );

    let port = env::server_port();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dispatcher listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                sigterm.recv().await;
                info!("SIGTERM received, shutting down");
            }
        })
        .await?;

    reaper_stop.cancel();
    let _ = reaper.await;
    Ok(())
}

/// Fail builds the store thinks are active; none can have a live worker
/// in a freshly-started dispatcher.
async fn reconcile_startup(store: &Arc<StoreClient>) {
    match store.active_builds().await {
        Ok(builds) if builds.is_empty() => {}
        Ok(builds) => {
            warn!(count = builds.len(), "failing orphaned builds from previous run");
            for build in builds {
                if let Err(e) = store
                    .set_build_status(&build.id, BuildStatus::Failed, Some("lost_worker"))
                    .await
                {
                    warn!(build_id = %build.id, error = %e, "failed to reconcile orphaned build");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "startup reconciliation could not list active builds");
        }
    }
}
