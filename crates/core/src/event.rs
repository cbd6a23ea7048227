// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only supervisor event log records

use serde::{Deserialize, Serialize};

/// Severity of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "debug" => EventLevel::Debug,
            "warning" => EventLevel::Warning,
            "error" => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known event type strings.
///
/// The event type is a free string so new producers don't need a schema
/// migration; these constants cover the types the engine itself emits.
pub mod kind {
    pub const STARTED: &str = "started";
    pub const STOPPED: &str = "stopped";
    pub const START_FAILED: &str = "start_failed";
    pub const PROCESS_DIED: &str = "process_died";
    pub const PROCESS_MISSING: &str = "process_missing";
    pub const PID_MISMATCH: &str = "pid_mismatch";
    pub const ZOMBIE_PROCESS: &str = "zombie_process";
    pub const ORPHAN_DETECTED: &str = "orphan_detected";
    pub const RECONCILIATION: &str = "reconciliation";
    pub const PORT_COLLISION: &str = "port_collision";
    pub const HEALTH_CHECK: &str = "health_check";
    pub const RESTART_TRIGGERED: &str = "restart_triggered";
    pub const STATE_MIGRATED: &str = "state_migrated";
}

/// One write-once entry in the event log.
///
/// `id` is assigned by the database on insert; readers see entries ordered
/// by timestamp with ties broken by insertion id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub id: i64,
    /// Unix seconds when the event was recorded.
    pub ts: f64,
    pub event_type: String,
    #[serde(default)]
    pub level: EventLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub message: String,
    /// Free-form structured payload (pids, ports, exit codes, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl EventRecord {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            ts: crate::clock::epoch_secs(),
            event_type: event_type.into(),
            level: EventLevel::Info,
            instance: None,
            message: message.into(),
            meta: None,
        }
    }

    pub fn level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn instance(mut self, name: impl Into<String>) -> Self {
        self.instance = Some(name.into());
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
