// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST implementation of [`BuildStore`].
//!
//! The store exposes PostgREST semantics: `GET /rest/v1/{table}?col=eq.x`
//! reads, `POST` inserts, `PATCH` with filters updates. Writes that must not
//! clobber terminal statuses carry a `status=not.in.(…)` filter and ask for
//! `return=representation` so the caller can tell whether the guard matched.

use crate::api::{BuildStore, LogEntry, StepPatch};
use crate::config::StoreConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use bm_core::{
    BuildId, BuildRow, BuildStatus, CustomPromptId, CustomPromptRow, CustomPromptStatus,
    PlannedPrompt, StepId, StepRow,
};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::json;

/// Filter matching the builds a live worker may still write to.
fn non_terminal_filter() -> String {
    let names: Vec<String> = BuildStatus::TERMINAL.iter().map(|s| s.to_string()).collect();
    format!("not.in.({})", names.join(","))
}

/// REST client for the external store.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    config: StoreConfig,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&config.anon_key) {
            headers.insert("apikey", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", config.bearer())) {
            headers.insert(AUTHORIZATION, v);
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status { status: status.as_u16(), body })
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StoreError> {
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, StoreError> {
        let resp = self
            .http
            .get(self.config.table_url(table))
            .query(query)
            .send()
            .await?;
        Self::read_json(Self::expect_success(resp).await?).await
    }
}

#[async_trait]
impl BuildStore for StoreClient {
    async fn get_build(&self, id: &BuildId) -> Result<Option<BuildRow>, StoreError> {
        let id_filter = format!("eq.{id}");
        let rows: Vec<BuildRow> =
            self.get_rows("builds", &[("id", id_filter.as_str()), ("select", "*")]).await?;
        Ok(rows.into_iter().next())
    }

    async fn set_build_status(
        &self,
        id: &BuildId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let id_filter = format!("eq.{id}");
        let guard = non_terminal_filter();
        let mut body = json!({
            "status": status,
            "updated_at": Utc::now(),
        });
        if let Some(error) = error {
            body["error"] = json!(error);
        }
        let resp = self
            .http
            .patch(self.config.table_url("builds"))
            .query(&[("id", id_filter.as_str()), ("status", guard.as_str())])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<BuildRow> = Self::read_json(Self::expect_success(resp).await?).await?;
        let matched = !rows.is_empty();
        if !matched {
            tracing::warn!(build_id = %id, status = %status, "status write guarded out (already terminal)");
        }
        Ok(matched)
    }

    async fn heartbeat(&self, id: &BuildId) -> Result<(), StoreError> {
        let id_filter = format!("eq.{id}");
        let resp = self
            .http
            .patch(self.config.table_url("builds"))
            .query(&[("id", id_filter.as_str())])
            .json(&json!({ "last_heartbeat": Utc::now() }))
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn planned_prompts(&self, id: &BuildId) -> Result<Vec<PlannedPrompt>, StoreError> {
        let id_filter = format!("eq.{id}");
        self.get_rows(
            "build_prompts",
            &[("build_id", id_filter.as_str()), ("order", "ordinal.asc"), ("select", "*")],
        )
        .await
    }

    async fn insert_step(&self, row: &StepRow) -> Result<StepRow, StoreError> {
        let resp = self
            .http
            .post(self.config.table_url("steps"))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let mut rows: Vec<StepRow> = Self::read_json(Self::expect_success(resp).await?).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Decode("insert returned no representation".to_string()))
    }

    async fn update_step(&self, id: &StepId, patch: &StepPatch) -> Result<(), StoreError> {
        let id_filter = format!("eq.{id}");
        let resp = self
            .http
            .patch(self.config.table_url("steps"))
            .query(&[("id", id_filter.as_str())])
            .json(patch)
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let resp = self
            .http
            .post(self.config.table_url("build_logs"))
            .json(entry)
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn pending_custom_prompts(
        &self,
        id: &BuildId,
    ) -> Result<Vec<CustomPromptRow>, StoreError> {
        let id_filter = format!("eq.{id}");
        self.get_rows(
            "custom_prompts",
            &[
                ("build_id", id_filter.as_str()),
                ("status", "eq.pending"),
                ("order", "created_at.asc,id.asc"),
                ("select", "*"),
            ],
        )
        .await
    }

    async fn set_custom_prompt_status(
        &self,
        id: &CustomPromptId,
        status: CustomPromptStatus,
    ) -> Result<(), StoreError> {
        let id_filter = format!("eq.{id}");
        let resp = self
            .http
            .patch(self.config.table_url("custom_prompts"))
            .query(&[("id", id_filter.as_str())])
            .json(&json!({ "status": status }))
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn active_builds(&self) -> Result<Vec<BuildRow>, StoreError> {
        self.get_rows("builds", &[("status", "in.(running,retrying)"), ("select", "*")]).await
    }

    async fn in_flight_step(&self, id: &BuildId) -> Result<Option<StepRow>, StoreError> {
        let id_filter = format!("eq.{id}");
        let rows: Vec<StepRow> = self
            .get_rows(
                "steps",
                &[
                    ("build_id", id_filter.as_str()),
                    ("status", "in.(running,retrying)"),
                    ("order", "ordinal.desc"),
                    ("limit", "1"),
                    ("select", "*"),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
