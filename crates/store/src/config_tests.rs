// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn bearer_prefers_service_key() {
    let cfg = StoreConfig::new("https://store.example", "anon")
        .service_key("service")
        .access_token("token");
    assert_eq!(cfg.bearer(), "service");
}

#[test]
fn bearer_falls_back_to_access_token_then_anon() {
    let cfg = StoreConfig::new("https://store.example", "anon").access_token("token");
    assert_eq!(cfg.bearer(), "token");

    let cfg = StoreConfig::new("https://store.example", "anon");
    assert_eq!(cfg.bearer(), "anon");
}

#[test]
fn table_url_trims_trailing_slash() {
    let cfg = StoreConfig::new("https://store.example//", "anon");
    assert_eq!(cfg.table_url("builds"), "https://store.example/rest/v1/builds");
}

#[test]
fn default_request_timeout() {
    let cfg = StoreConfig::new("https://store.example", "anon");
    assert_eq!(cfg.request_timeout, Duration::from_secs(10));
}

#[test]
#[serial]
fn from_env_requires_url_and_anon_key() {
    std::env::remove_var("STORE_URL");
    std::env::remove_var("STORE_ANON_KEY");
    assert!(StoreConfig::from_env().is_none());

    std::env::set_var("STORE_URL", "https://store.example");
    assert!(StoreConfig::from_env().is_none());

    std::env::set_var("STORE_ANON_KEY", "anon");
    std::env::set_var("STORE_SERVICE_KEY", "service");
    let cfg = StoreConfig::from_env().unwrap();
    assert_eq!(cfg.url, "https://store.example");
    assert_eq!(cfg.bearer(), "service");

    std::env::remove_var("STORE_URL");
    std::env::remove_var("STORE_ANON_KEY");
    std::env::remove_var("STORE_SERVICE_KEY");
}
