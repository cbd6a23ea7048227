// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by configuration load, save and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration found for instance '{name}' at {path}")]
    NotFound { name: String, path: PathBuf },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration for '{name}': {}", violations.join("; "))]
    Invalid {
        name: String,
        violations: Vec<String>,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
