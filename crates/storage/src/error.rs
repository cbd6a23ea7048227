// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error types

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    /// Transient: the caller may retry after a short delay.
    #[error("timed out waiting for lock on '{name}' after {elapsed_secs:.1}s (held by pid {owner_pid:?} for '{operation}')")]
    LockTimeout {
        name: String,
        elapsed_secs: f64,
        owner_pid: Option<u32>,
        operation: String,
    },
    #[error("lock on '{name}' is owned by pid {owner_pid}, not this process")]
    LockNotOwned { name: String, owner_pid: u32 },
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::LockTimeout { .. })
    }
}
