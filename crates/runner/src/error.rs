// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner errors.

use bm_core::BuildId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("store error: {0}")]
    Store(#[from] bm_store::StoreError),

    #[error("agent error: {0}")]
    Agent(#[from] bm_agent::AgentError),

    #[error("build {0} not found in store")]
    BuildNotFound(BuildId),

    #[error("workspace setup failed: {0}")]
    Workspace(std::io::Error),
}
