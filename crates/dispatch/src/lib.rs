// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bm-dispatch: the long-lived supervisor process.
//!
//! Accepts build-start requests over HTTP, enforces the global concurrency
//! cap, spawns one worker process per build, tracks active builds in memory,
//! manages preview dev servers and their port pool, and reaps crashed
//! workers, stale builds, and leaked ports. The in-memory maps are caches;
//! the external store is the source of truth.

pub mod env;

mod error;
mod http;
mod ports;
mod preview;
mod reaper;
mod registry;
mod spawn;

pub use error::DispatchError;
pub use http::{router, AppState, StartCreds};
pub use ports::PortPool;
pub use preview::{PreviewError, PreviewManager};
pub use reaper::{reap_once, spawn_reaper};
pub use registry::{ActiveBuild, RegisterError, Registry};
pub use spawn::{ProcessSpawner, WorkerSpawner};
