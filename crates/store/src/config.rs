// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store connection configuration.

use std::time::Duration;

/// Credentials and endpoint for the external store.
///
/// The `anon_key` always travels in the `apikey` header; the bearer token is
/// the strongest credential available: service key, then user access token,
/// then the anon key itself.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub anon_key: String,
    pub service_key: Option<String>,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: trim_trailing_slash(url.into()),
            anon_key: anon_key.into(),
            service_key: None,
            access_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    bm_core::setters! {
        set {
            request_timeout: Duration,
        }
        option {
            service_key: String,
            access_token: String,
        }
    }

    /// Read `STORE_URL` / `STORE_ANON_KEY` / `STORE_SERVICE_KEY` /
    /// `STORE_ACCESS_TOKEN` from the environment.
    ///
    /// Returns `None` when the required url or anon key is absent.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("STORE_URL").ok().filter(|s| !s.is_empty())?;
        let anon_key = std::env::var("STORE_ANON_KEY").ok().filter(|s| !s.is_empty())?;
        let mut cfg = Self::new(url, anon_key);
        cfg.service_key = std::env::var("STORE_SERVICE_KEY").ok().filter(|s| !s.is_empty());
        cfg.access_token = std::env::var("STORE_ACCESS_TOKEN").ok().filter(|s| !s.is_empty());
        Some(cfg)
    }

    /// The bearer credential for the `Authorization` header.
    pub fn bearer(&self) -> &str {
        self.service_key
            .as_deref()
            .or(self.access_token.as_deref())
            .unwrap_or(&self.anon_key)
    }

    /// Absolute URL for a table endpoint.
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
