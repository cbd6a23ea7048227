// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered security modes and the container envelope
//!
//! This module is the only place security parameters are computed; the
//! container adapter just translates the envelope to engine flags.

use crate::error::RunnerError;
use herd_adapters::NetworkMode;
use serde::{Deserialize, Serialize};

/// Isolation tier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Workspace read-only, no network, all capabilities dropped,
    /// read-only root filesystem, resource-limited.
    Readonly,
    /// Workspace writable, no network, all capabilities dropped,
    /// resource-limited.
    #[default]
    WorkspaceWrite,
    /// Workspace writable, bridged network, default capabilities. Requires
    /// explicit confirmation.
    FullAccess,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::Readonly => "readonly",
            SecurityMode::WorkspaceWrite => "workspace_write",
            SecurityMode::FullAccess => "full_access",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "readonly" => Some(SecurityMode::Readonly),
            "workspace_write" => Some(SecurityMode::WorkspaceWrite),
            "full_access" => Some(SecurityMode::FullAccess),
            _ => None,
        }
    }

    /// Modes that can reach the network and keep capabilities.
    pub fn is_dangerous(&self) -> bool {
        matches!(self, SecurityMode::FullAccess)
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container-level security and resource parameters derived from a mode.
#[derive(Debug, Clone)]
pub struct ContainerEnvelope {
    pub workspace_read_only: bool,
    pub network: NetworkMode,
    pub cap_drop: Vec<String>,
    pub read_only_root: bool,
    pub memory_limit: Option<String>,
    pub cpus: Option<f64>,
    pub pids_limit: Option<u32>,
}

/// The one mapping from mode to envelope.
pub fn envelope(mode: SecurityMode) -> ContainerEnvelope {
    match mode {
        SecurityMode::Readonly => ContainerEnvelope {
            workspace_read_only: true,
            network: NetworkMode::None,
            cap_drop: vec!["ALL".to_string()],
            read_only_root: true,
            memory_limit: Some("4g".to_string()),
            cpus: Some(2.0),
            pids_limit: Some(256),
        },
        SecurityMode::WorkspaceWrite => ContainerEnvelope {
            workspace_read_only: false,
            network: NetworkMode::None,
            cap_drop: vec!["ALL".to_string()],
            read_only_root: false,
            memory_limit: Some("4g".to_string()),
            cpus: Some(2.0),
            pids_limit: Some(256),
        },
        SecurityMode::FullAccess => ContainerEnvelope {
            workspace_read_only: false,
            network: NetworkMode::Bridge,
            cap_drop: Vec::new(),
            read_only_root: false,
            memory_limit: None,
            cpus: None,
            pids_limit: None,
        },
    }
}

/// Refuse dangerous modes unless the caller explicitly confirmed.
pub fn validate_mode(mode: SecurityMode, confirmed: bool) -> Result<(), RunnerError> {
    if mode.is_dangerous() && !confirmed {
        return Err(RunnerError::SecurityRefused {
            message: format!("mode '{mode}' requires explicit confirmation"),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "security_tests.rs"]
mod tests;
