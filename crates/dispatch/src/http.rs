// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: build dispatch, observability, preview control.
//!
//! JSON in/out, CORS for GET/POST/DELETE/OPTIONS, and an optional api-key
//! gate (`x-api-key`) applied to every route when `MCP_BUILD_API_KEY` is
//! set. Dispatch-time failures map to 400/401/404/409/429/503; build
//! failures never surface here, only in the store.

use crate::preview::{PreviewError, PreviewManager};
use crate::registry::{RegisterError, Registry};
use crate::spawn::WorkerSpawner;
use axum::extract::{Path, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bm_core::{BuildId, BuildStatus};
use bm_store::BuildStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Store credentials carried by a start request and forwarded to the worker
/// environment.
#[derive(Debug, Clone)]
pub struct StartCreds {
    pub store_url: String,
    pub anon_key: String,
    pub service_key: Option<String>,
    pub access_token: Option<String>,
}

/// Shared handler state.
pub struct AppState<S> {
    pub registry: Registry,
    pub preview: PreviewManager,
    pub store: Arc<S>,
    pub spawner: Arc<dyn WorkerSpawner>,
    pub api_key: Option<String>,
    pub workspace_root: PathBuf,
    pub started_at: Instant,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            preview: self.preview.clone(),
            store: Arc::clone(&self.store),
            spawner: Arc::clone(&self.spawner),
            api_key: self.api_key.clone(),
            workspace_root: self.workspace_root.clone(),
            started_at: self.started_at,
        }
    }
}

/// Build the full API router.
pub fn router<S: BuildStore>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/start-build", post(start_build::<S>))
        .route("/api/health", get(health::<S>))
        .route("/api/builds", get(list_builds::<S>))
        .route(
            "/api/builds/{id}/preview",
            post(start_preview::<S>).delete(stop_preview::<S>),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key::<S>))
        .layer(cors)
        .with_state(state)
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Reject requests without the configured api key. A no-op when no key is
/// configured.
async fn require_api_key<S: BuildStore>(
    State(state): State<AppState<S>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return json_error(StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }
    next.run(req).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBuildRequest {
    build_id: Option<String>,
    store_url: Option<String>,
    anon_key: Option<String>,
    service_key: Option<String>,
    access_token: Option<String>,
}

async fn start_build<S: BuildStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<StartBuildRequest>,
) -> Response {
    let Some(build_id) = req.build_id.filter(|s| !s.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "missing buildId");
    };
    let Some(store_url) = req.store_url.filter(|s| !s.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "missing storeUrl");
    };
    let Some(anon_key) = req.anon_key.filter(|s| !s.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "missing anonKey");
    };
    let build_id = BuildId::new(build_id);

    match state.registry.try_register(&build_id) {
        Ok(()) => {}
        Err(RegisterError::AlreadyActive) => {
            // Re-delivery for a live build is a no-op.
            info!(build_id = %build_id, "start request for already-active build");
            return (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response();
        }
        Err(RegisterError::Busy) => {
            return json_error(StatusCode::TOO_MANY_REQUESTS, "busy");
        }
    }

    // The registry only knows about this instance's workers. The store row
    // can still be running/retrying without an entry — a worker that died
    // without writing its own status holds that state until the reaper's
    // heartbeat check — and a re-delivered start in that window must not
    // spawn a second worker.
    match state.store.get_build(&build_id).await {
        Ok(Some(build)) if build.status.is_active() => {
            info!(build_id = %build_id, status = %build.status, "start request for store-active build");
            state.registry.remove(&build_id);
            return (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response();
        }
        Ok(_) => {}
        Err(e) => {
            // The worker has its own store retries; don't reject the build
            // over a flaky read here.
            error!(build_id = %build_id, error = %e, "store lookup failed during start, proceeding");
        }
    }

    let creds = StartCreds {
        store_url,
        anon_key,
        service_key: req.service_key.filter(|s| !s.is_empty()),
        access_token: req.access_token.filter(|s| !s.is_empty()),
    };

    match state.spawner.spawn(&build_id, &creds).await {
        Ok(pid) => {
            state.registry.set_pid(&build_id, pid);
            (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
        }
        Err(e) => {
            error!(build_id = %build_id, error = %e, "worker spawn failed");
            state.registry.remove(&build_id);
            let _ = state
                .store
                .set_build_status(&build_id, BuildStatus::Failed, Some("worker spawn failed"))
                .await;
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "spawn failed")
        }
    }
}

async fn health<S: BuildStore>(State(state): State<AppState<S>>) -> Response {
    let disk_free = fs2::available_space(&state.workspace_root)
        .or_else(|_| fs2::available_space("."))
        .unwrap_or(0);
    let body = json!({
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "memoryBytes": self_memory_bytes(),
        "diskFreeBytes": disk_free,
        "activeBuilds": state.registry.len(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

fn self_memory_bytes() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildSummary {
    build_id: BuildId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_step: Option<u32>,
}

async fn list_builds<S: BuildStore>(State(state): State<AppState<S>>) -> Response {
    let mut builds = Vec::new();
    for entry in state.registry.list() {
        // Best-effort enrichment from the store; a flaky store must not take
        // the listing down.
        let current_step = state
            .store
            .in_flight_step(&entry.build_id)
            .await
            .ok()
            .flatten()
            .map(|s| s.ordinal)
            .or(entry.current_step);
        state.registry.set_current_step(&entry.build_id, current_step);

        builds.push(BuildSummary {
            port: state.preview.entry(&entry.build_id).map(|p| p.port),
            build_id: entry.build_id,
            pid: entry.pid,
            started_at: entry.started_at.to_rfc3339(),
            current_step,
        });
    }
    (StatusCode::OK, Json(json!({ "builds": builds }))).into_response()
}

async fn start_preview<S: BuildStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    let build_id = BuildId::new(id);
    match state.store.get_build(&build_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "unknown build"),
        Err(e) => {
            error!(build_id = %build_id, error = %e, "store lookup failed");
            return json_error(StatusCode::SERVICE_UNAVAILABLE, "store unavailable");
        }
    }

    let workspace = state.workspace_root.join(build_id.as_str());
    match state.preview.start(&build_id, &workspace) {
        Ok(entry) => {
            (StatusCode::OK, Json(json!({ "port": entry.port, "pid": entry.pid })))
                .into_response()
        }
        Err(PreviewError::AlreadyRunning) => {
            json_error(StatusCode::CONFLICT, "preview already running")
        }
        Err(PreviewError::NoPortsAvailable) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "no ports available")
        }
        Err(e) => {
            error!(build_id = %build_id, error = %e, "preview spawn failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "spawn failed")
        }
    }
}

async fn stop_preview<S: BuildStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    let build_id = BuildId::new(id);
    match state.preview.stop(&build_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(PreviewError::NotFound) => json_error(StatusCode::NOT_FOUND, "no preview"),
        Err(e) => {
            error!(build_id = %build_id, error = %e, "preview stop failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "stop failed")
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
