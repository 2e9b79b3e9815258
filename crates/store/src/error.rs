// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy.

use thiserror::Error;

/// Errors from the external store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store response decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether the error is worth retrying within a step's attempt budget.
    ///
    /// Connect failures, request timeouts, 408/429, and 5xx are transient;
    /// auth and other 4xx responses are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_timeout() || e.is_connect(),
            StoreError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            StoreError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
