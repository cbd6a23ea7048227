// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner error types
//!
//! Tool failures inside a run are data (they land in `run_result.json`);
//! these errors cover refusals and infrastructure problems only.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("security policy refused the run: {message}")]
    SecurityRefused { message: String },
    #[error("run {run_id} is sealed; its directory is immutable")]
    RunSealed { run_id: Uuid },
    #[error("run {run_id} not found")]
    RunNotFound { run_id: Uuid },
    #[error("git operation failed: {message}")]
    Git { message: String },
    #[error(transparent)]
    Container(#[from] herd_adapters::ContainerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
