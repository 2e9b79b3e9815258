// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("store error: {0}")]
    Store(#[from] bm_store::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
