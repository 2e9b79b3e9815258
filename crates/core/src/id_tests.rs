// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::build::BuildId;
use crate::step::StepId;

#[test]
fn id_display_roundtrip() {
    let id = BuildId::new("b6c1f8a2-0000-4000-8000-000000000001");
    assert_eq!(id.to_string(), "b6c1f8a2-0000-4000-8000-000000000001");
    assert_eq!(id.as_str(), "b6c1f8a2-0000-4000-8000-000000000001");
}

#[test]
fn id_equality() {
    let a = BuildId::new("build-1");
    let b = BuildId::new("build-1");
    let c = BuildId::new("build-2");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a, "build-1");
}

#[test]
fn id_from_str() {
    let id: StepId = "step-9".into();
    assert_eq!(id.as_str(), "step-9");
}

#[test]
fn id_serde_is_transparent() {
    let id = BuildId::new("my-build");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-build\"");

    let parsed: BuildId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn generated_ids_are_unique_uuids() {
    let a = BuildId::generate();
    let b = BuildId::generate();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 36);
}

#[test]
fn short_truncates() {
    let id = BuildId::new("abcdefgh");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefgh");
}
