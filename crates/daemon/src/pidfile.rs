// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon pid file with stale detection

use herd_adapters::process::pid_alive;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds the daemon pid file; removes it on drop.
#[derive(Debug)]
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    /// Claim the pid file. An existing file naming a live pid refuses; a
    /// stale file (dead owner, unparseable) is replaced.
    pub fn acquire(path: &Path) -> Result<Self, PidFileError> {
        if let Ok(content) = std::fs::read_to_string(path) {
            match content.trim().parse::<u32>() {
                Ok(pid) if pid_alive(pid) => {
                    return Err(PidFileError::AlreadyRunning { pid });
                }
                Ok(pid) => {
                    info!(pid, "removing stale pid file");
                }
                Err(_) => {
                    warn!(path = %path.display(), "replacing unparseable pid file");
                }
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}\n", std::process::id()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Pid recorded in a daemon pid file, when it names a live process.
pub fn running_daemon_pid(path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(path).ok()?;
    let pid = content.trim().parse::<u32>().ok()?;
    pid_alive(pid).then_some(pid)
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
