// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn creates_missing_workspace() {
    let root = tempfile::tempdir().unwrap();
    let build_id = BuildId::new("b-1");

    let path = resolve_workspace(root.path(), &build_id).await.unwrap();

    assert_eq!(path, root.path().join("b-1"));
    assert!(path.is_dir());
}

#[tokio::test]
async fn existing_workspace_is_left_alone() {
    let root = tempfile::tempdir().unwrap();
    let build_id = BuildId::new("b-2");
    let pre = root.path().join("b-2");
    tokio::fs::create_dir_all(pre.join("src")).await.unwrap();
    tokio::fs::write(pre.join("src/index.ts"), "export {}").await.unwrap();

    let path = resolve_workspace(root.path(), &build_id).await.unwrap();

    assert!(path.join("src/index.ts").is_file());
}
