// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buildmill worker (bm-worker)
//!
//! Short-lived process that runs one Build Runner to completion. Spawned by
//! the dispatcher with its entire configuration in environment variables:
//! `BUILD_ID`, `STORE_URL`/`STORE_ANON_KEY` (and optional service key or
//! access token), `MCP_AGENT_CMD`, `MCP_WORKSPACE_ROOT`, plus the `MCP_*`
//! tuning knobs. Exit code 0 on completion or cancellation, 1 on failure.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use bm_agent::{AgentCommand, CliAgent};
use bm_core::{BuildId, SystemClock};
use bm_runner::{resolve_workspace, Runner, RunnerSettings};
use bm_store::{StoreClient, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let code = match run().await {
        Ok(outcome) => {
            info!(?outcome, "worker done");
            outcome.exit_code()
        }
        Err(e) => {
            error!(error = %e, "worker failed");
            1
        }
    };
    std::process::exit(code);
}

fn required_env(key: &str) -> Result<String, String> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing required environment variable {key}"))
}

async fn run() -> Result<bm_runner::BuildOutcome, Box<dyn std::error::Error>> {
    let build_id = BuildId::new(required_env("BUILD_ID")?);
    let store_config = StoreConfig::from_env()
        .ok_or("missing required environment variables STORE_URL / STORE_ANON_KEY")?;
    let agent_command = AgentCommand::parse(&required_env("MCP_AGENT_CMD")?)?;
    let workspace_root = std::env::var("MCP_WORKSPACE_ROOT")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./workspaces"));
    let settings = RunnerSettings::from_env();

    let store = Arc::new(StoreClient::new(store_config)?);
    let agent = Arc::new(CliAgent::new(agent_command));
    let workspace = resolve_workspace(&workspace_root, &build_id).await?;

    info!(build_id = %build_id, workspace = %workspace.display(), "worker starting");

    let runner = Runner::new(store, agent, SystemClock, settings, build_id, workspace);

    // SIGTERM from the dispatcher (or operator) cancels the build.
    let cancel = runner.cancel_token();
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        sigterm.recv().await;
        info!("SIGTERM received, cancelling build");
        cancel.cancel();
    });

    Ok(runner.run().await?)
}
