// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run filesystem workspace
//!
//! One directory per run, named by UUID, created with a frozen
//! `request.json` and sealed by `run_result.json`. After sealing, every
//! mutating method refuses; only the out-of-band `status.json` marker may
//! still be written (cancellation races the seal by design).

use crate::error::RunnerError;
use crate::security::SecurityMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const REQUEST_FILE: &str = "request.json";
pub const LOG_FILE: &str = "log.txt";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const RESPONSE_FILE: &str = "response.json";
pub const PATCH_FILE: &str = "changes.patch";
pub const RESULT_FILE: &str = "run_result.json";
pub const STATUS_FILE: &str = "status.json";

/// Terminal and in-flight run states.
///
/// `Success` and `Done` are both terminal-success; `Done` arrives via the
/// tool's status marker, `Success` from a clean exit without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Done,
    NeedUser,
    Timeout,
    Cancelled,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Done => "done",
            RunStatus::NeedUser => "need_user",
            RunStatus::Timeout => "timeout",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Done)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frozen input of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Tool tag, e.g. `codex`. Part of the deterministic container name.
    pub provider: String,
    pub task: String,
    pub security_mode: SecurityMode,
    pub repo_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    pub timeout_secs: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

impl RunRequest {
    pub fn new(provider: impl Into<String>, task: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            provider: provider.into(),
            task: task.into(),
            security_mode: SecurityMode::default(),
            repo_path: repo_path.into(),
            working_dir: None,
            timeout_secs: 300,
            env: HashMap::new(),
            verify: false,
            output_schema: None,
            output_format: None,
        }
    }
}

/// Canonical terminal record of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub provider: String,
    pub status: RunStatus,
    pub exit_code: Option<i64>,
    pub duration_secs: f64,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Handle to one run's directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    dir: PathBuf,
    run_id: Uuid,
}

impl RunDirectory {
    /// Create `<runs>/<uuid>/` and freeze the request into it.
    pub fn create(runs_root: &Path, request: &RunRequest) -> Result<Self, RunnerError> {
        let dir = runs_root.join(request.run_id.to_string());
        std::fs::create_dir_all(&dir)?;
        let rundir = Self {
            dir,
            run_id: request.run_id,
        };
        std::fs::write(
            rundir.path(REQUEST_FILE),
            serde_json::to_vec_pretty(request)?,
        )?;
        Ok(rundir)
    }

    /// Open an existing run directory.
    pub fn open(runs_root: &Path, run_id: Uuid) -> Result<Self, RunnerError> {
        let dir = runs_root.join(run_id.to_string());
        if !dir.is_dir() {
            return Err(RunnerError::RunNotFound { run_id });
        }
        Ok(Self { dir, run_id })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Sealed runs are immutable.
    pub fn is_sealed(&self) -> bool {
        self.path(RESULT_FILE).exists()
    }

    fn refuse_if_sealed(&self) -> Result<(), RunnerError> {
        if self.is_sealed() {
            return Err(RunnerError::RunSealed {
                run_id: self.run_id,
            });
        }
        Ok(())
    }

    pub fn load_request(&self) -> Result<RunRequest, RunnerError> {
        let text = std::fs::read_to_string(self.path(REQUEST_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Append already-sanitized text to the streamed log.
    pub fn append_log(&self, text: &str) -> Result<(), RunnerError> {
        self.refuse_if_sealed()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(LOG_FILE))?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<String, RunnerError> {
        let path = self.path(LOG_FILE);
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// Write parsed events, one JSON object per line, order preserved.
    pub fn write_events(&self, events: &[serde_json::Value]) -> Result<(), RunnerError> {
        self.refuse_if_sealed()?;
        let mut out = String::new();
        for event in events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        std::fs::write(self.path(EVENTS_FILE), out)?;
        Ok(())
    }

    pub fn write_response(&self, response: &serde_json::Value) -> Result<(), RunnerError> {
        self.refuse_if_sealed()?;
        std::fs::write(
            self.path(RESPONSE_FILE),
            serde_json::to_vec_pretty(response)?,
        )?;
        Ok(())
    }

    pub fn write_patch(&self, patch: &str) -> Result<(), RunnerError> {
        self.refuse_if_sealed()?;
        std::fs::write(self.path(PATCH_FILE), patch)?;
        Ok(())
    }

    /// Seal the run. After this the directory is immutable.
    pub fn seal(&self, result: &RunResult) -> Result<(), RunnerError> {
        self.refuse_if_sealed()?;
        std::fs::write(self.path(RESULT_FILE), serde_json::to_vec_pretty(result)?)?;
        Ok(())
    }

    pub fn load_result(&self) -> Result<Option<RunResult>, RunnerError> {
        let path = self.path(RESULT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Out-of-band status marker (cancellation). Allowed even on sealed
    /// runs; cancellation can race the seal.
    pub fn write_status_marker(&self, status: RunStatus) -> Result<(), RunnerError> {
        let value = serde_json::json!({
            "run_id": self.run_id,
            "status": status,
            "written_at": Utc::now(),
        });
        std::fs::write(self.path(STATUS_FILE), serde_json::to_vec_pretty(&value)?)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "rundir_tests.rs"]
mod tests;
