// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent runtime record for a managed instance

use crate::clock::{epoch_secs, format_uptime};
use crate::status::{HealthStatus, InstanceStatus};
use serde::{Deserialize, Serialize};

/// Observed runtime state of one instance, keyed by instance name.
///
/// Owned by the supervisor and persisted in the state database. Distinct
/// from the operator's desired state: this records what was last observed,
/// and the reconciler corrects it when the process table disagrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub name: String,
    pub pid: Option<u32>,
    pub port: Option<u16>,
    /// Full command line the child was launched with.
    #[serde(default)]
    pub cmdline: String,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub health: HealthStatus,
    /// Unix seconds at spawn; `None` while stopped.
    pub started_at: Option<f64>,
    /// Unix seconds the reconciler last saw the process alive.
    pub last_seen_at: Option<f64>,
    pub last_health_check: Option<f64>,
    #[serde(default)]
    pub restart_count: u32,
    /// Fingerprint of the configuration the instance was launched with.
    #[serde(default)]
    pub config_hash: String,
    /// Version tag of the installed binary in use.
    #[serde(default)]
    pub binary_version: String,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub updated_at: f64,
}

impl RuntimeRecord {
    /// Fresh record for an instance that has never been started.
    pub fn stopped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pid: None,
            port: None,
            cmdline: String::new(),
            status: InstanceStatus::Stopped,
            health: HealthStatus::Unknown,
            started_at: None,
            last_seen_at: None,
            last_health_check: None,
            restart_count: 0,
            config_hash: String::new(),
            binary_version: String::new(),
            last_error: String::new(),
            updated_at: epoch_secs(),
        }
    }

    /// Seconds since the instance started, or `None` when not running.
    pub fn uptime(&self) -> Option<f64> {
        let started = self.started_at?;
        Some((epoch_secs() - started).max(0.0))
    }

    pub fn uptime_str(&self) -> String {
        match self.uptime() {
            Some(secs) => format_uptime(secs as u64),
            None => "-".to_string(),
        }
    }

    /// Mark the record stopped after the process disappeared or was stopped.
    pub fn mark_stopped(&mut self, error: impl Into<String>) {
        self.status = InstanceStatus::Stopped;
        self.health = HealthStatus::Unknown;
        self.pid = None;
        self.last_error = error.into();
        self.updated_at = epoch_secs();
    }

    /// Mark the record errored, keeping the pid for inspection.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.status = InstanceStatus::Error;
        self.health = HealthStatus::Error;
        self.last_error = error.into();
        self.updated_at = epoch_secs();
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
