// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project directory layout
//!
//! Everything herd owns lives under one root (default `~/.herd`, override
//! with `HERD_HOME`):
//!
//! ```text
//! <root>/bins/          installed server artifacts + registry.json
//! <root>/instances/     one config.json per instance
//! <root>/state/         state.sqlite, daemon.pid, daemon.log, locks/
//! <root>/logs/<name>/   child stdout/stderr logs
//! <root>/runs/<uuid>/   per-run directories for containerized tool runs
//! ```

use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "HERD_HOME";

#[derive(Debug, Clone)]
pub struct ProjectDirs {
    root: PathBuf,
}

impl ProjectDirs {
    /// Root from `HERD_HOME`, else `~/.herd`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".herd")
            });
        Self { root }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bins_dir(&self) -> PathBuf {
        self.root.join("bins")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    pub fn instance_dir(&self, name: &str) -> PathBuf {
        self.instances_dir().join(name)
    }

    pub fn instance_config_path(&self, name: &str) -> PathBuf {
        self.instance_dir(name).join("config.json")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_dir().join("state.sqlite")
    }

    pub fn daemon_pid_path(&self) -> PathBuf {
        self.state_dir().join("daemon.pid")
    }

    pub fn daemon_log_path(&self) -> PathBuf {
        self.state_dir().join("daemon.log")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir().join("locks")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn instance_logs_dir(&self, name: &str) -> PathBuf {
        self.logs_dir().join(name)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join("schemas")
    }

    /// Create every directory the layout needs.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            self.bins_dir(),
            self.instances_dir(),
            self.state_dir(),
            self.locks_dir(),
            self.logs_dir(),
            self.runs_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
