// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-build workspace resolution.
//!
//! The scaffolding subsystem normally creates the workspace before the build
//! starts; the runner only resolves the path and fills in the directory if
//! scaffolding has not run yet. The agent owns everything inside it.

use bm_core::BuildId;
use std::path::{Path, PathBuf};

/// Resolve (and if necessary create) the workspace directory for a build.
pub async fn resolve_workspace(root: &Path, build_id: &BuildId) -> std::io::Result<PathBuf> {
    let path = root.join(build_id.as_str());
    if !path.is_dir() {
        tokio::fs::create_dir_all(&path).await?;
        tracing::info!(workspace = %path.display(), "created build workspace");
    }
    Ok(path)
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
