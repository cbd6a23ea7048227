// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy
//!
//! Only operator-initiated operations surface these; probe and
//! reconciliation layers report classifications instead of failing.

use herd_adapters::PortConflict;
use herd_core::ExitCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] herd_config::ConfigError),
    #[error("instance '{name}' is already running (pid {pid})")]
    AlreadyRunning { name: String, pid: u32 },
    #[error("instance '{name}' has no runtime record")]
    NotRunning { name: String },
    #[error("{conflict}{}", conflict.suggested.map(|p| format!("; port {p} is free")).unwrap_or_default())]
    PortConflict { conflict: PortConflict },
    #[error("no installed binary matches the configuration of '{name}'")]
    BinaryNotInstalled { name: String },
    #[error("model file not found: {path}")]
    ModelMissing { path: PathBuf },
    #[error("instance '{name}' failed to start: {message}")]
    SpawnFailed {
        name: String,
        exit_code: Option<i32>,
        message: String,
    },
    #[error(transparent)]
    Storage(#[from] herd_storage::StorageError),
    #[error(transparent)]
    Binary(#[from] herd_binaries::BinaryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Exit code for tooling consumers.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            EngineError::Config(herd_config::ConfigError::NotFound { .. }) => {
                ExitCode::InstanceNotFound
            }
            EngineError::Config(herd_config::ConfigError::Parse { .. }) => {
                ExitCode::ConfigParseError
            }
            EngineError::Config(_) => ExitCode::ConfigInvalid,
            EngineError::AlreadyRunning { .. } => ExitCode::InstanceAlreadyRunning,
            EngineError::NotRunning { .. } => ExitCode::InstanceNotRunning,
            EngineError::PortConflict { .. } => ExitCode::PortInUse,
            EngineError::BinaryNotInstalled { .. } => ExitCode::BinaryNotFound,
            EngineError::ModelMissing { .. } => ExitCode::ModelNotFound,
            EngineError::SpawnFailed { .. } => ExitCode::SpawnFailed,
            EngineError::Storage(herd_storage::StorageError::LockTimeout { .. }) => {
                ExitCode::LockTimeout
            }
            EngineError::Storage(_) => ExitCode::StateCorrupt,
            EngineError::Binary(herd_binaries::BinaryError::ChecksumMismatch { .. }) => {
                ExitCode::ChecksumMismatch
            }
            EngineError::Binary(herd_binaries::BinaryError::Download { .. }) => {
                ExitCode::DownloadFailed
            }
            EngineError::Binary(_) => ExitCode::BinaryInvalid,
            EngineError::Io(_) | EngineError::Internal(_) => ExitCode::GeneralError,
        }
    }

    /// Transient errors are worth retrying without operator changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Storage(herd_storage::StorageError::LockTimeout { .. })
        )
    }
}
