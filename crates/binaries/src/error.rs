// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary management error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from registry, download and install operations.
#[derive(Debug, Error)]
pub enum BinaryError {
    #[error("binary {0} not found in registry")]
    NotFound(uuid::Uuid),
    #[error("binary {0} already exists in registry")]
    Duplicate(uuid::Uuid),
    #[error("release API rate limit exceeded{}", reset.map(|t| format!(" (resets at {})", t.to_rfc3339())).unwrap_or_default())]
    RateLimited { reset: Option<DateTime<Utc>> },
    #[error("release API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },
    #[error("sha256 mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),
    #[error("unsafe path in archive: {0}")]
    UnsafeArchivePath(String),
    #[error("archive declares {declared_bytes} bytes, over the {limit_bytes} byte limit")]
    ArchiveTooLarge { declared_bytes: u64, limit_bytes: u64 },
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
    #[error("unknown variant tag: {0}")]
    UnknownVariant(String),
    #[error("storage error: {0}")]
    Storage(#[from] herd_storage::StorageError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
