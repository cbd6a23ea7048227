// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detached child spawning with inherited log handles
//!
//! The child gets its own process group and append-mode handles to the
//! rotated log files as stdio. The parent's handles are given away at
//! spawn and never retained: a parent holding them open is what turns a
//! full pipe into a deadlock, so the invariant here is zero parent-held
//! handles once `start_detached` returns.

use crate::error::EngineError;
use herd_adapters::process;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to watch for an immediate crash after spawn.
const CRASH_WATCH_DELAY: Duration = Duration::from_millis(300);

/// Default graceful-stop window before SIGKILL.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Successful spawn details.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub pid: u32,
    pub cmdline: String,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

/// Timestamped log rotation: each start writes to `<base>.<ts>.log`,
/// keeping the newest `keep` files per stream.
pub struct LogRotator {
    dir: PathBuf,
    keep: u32,
}

impl LogRotator {
    pub fn new(dir: impl Into<PathBuf>, keep: u32) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    /// Delete old `<base>.*.log` files and return the path for a new one.
    pub fn rotate(&self, base: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let prefix = format!("{base}.");
        let mut existing: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| {
                        let n = n.to_string_lossy();
                        n.starts_with(&prefix) && n.ends_with(".log")
                    })
                    .unwrap_or(false)
            })
            .collect();
        existing.sort();
        existing.reverse();

        for old in existing.iter().skip(self.keep as usize - 1) {
            match std::fs::remove_file(old) {
                Ok(()) => debug!(path = %old.display(), "removed rotated log"),
                Err(e) => warn!(path = %old.display(), error = %e, "failed to remove rotated log"),
            }
        }

        let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        Ok(self.dir.join(format!("{base}.{ts}.log")))
    }
}

/// Append a startup banner so operators can find run boundaries in logs.
pub fn write_startup_marker(path: &Path, cmdline: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", "=".repeat(60))?;
    writeln!(
        file,
        "started at {} by pid {}",
        chrono::Utc::now().to_rfc3339(),
        std::process::id()
    )?;
    writeln!(file, "command: {cmdline}")?;
    writeln!(file, "{}", "=".repeat(60))?;
    Ok(())
}

/// Append a shutdown banner.
pub fn write_shutdown_marker(path: &Path, reason: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", "=".repeat(60))?;
    writeln!(
        file,
        "stopped at {} ({reason})",
        chrono::Utc::now().to_rfc3339()
    )?;
    writeln!(file, "{}", "=".repeat(60))?;
    Ok(())
}

/// Newest rotated log file for a stream, if any.
pub fn latest_log(dir: &Path, base: &str) -> Option<PathBuf> {
    let prefix = format!("{base}.");
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| {
                    let n = n.to_string_lossy();
                    n.starts_with(&prefix) && n.ends_with(".log")
                })
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.pop()
}

/// Last `lines` lines of the newest log for a stream.
pub fn tail_log(dir: &Path, base: &str, lines: usize) -> String {
    let Some(path) = latest_log(dir, base) else {
        return String::new();
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return String::new();
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Spawn `command` detached with rotated log files as its stdio.
///
/// Returns an error when the child exits within the crash-watch window,
/// carrying the exit code.
pub async fn start_detached(
    name: &str,
    command: &[String],
    env: &HashMap<String, String>,
    cwd: &Path,
    log_dir: &Path,
    rotation_keep: u32,
) -> Result<SpawnOutcome, EngineError> {
    let (program, args) = command.split_first().ok_or_else(|| {
        EngineError::Internal("empty command line".to_string())
    })?;
    let cmdline = command.join(" ");

    let rotator = LogRotator::new(log_dir, rotation_keep);
    let stdout_log = rotator.rotate("stdout")?;
    let stderr_log = rotator.rotate("stderr")?;

    write_startup_marker(&stdout_log, &cmdline)?;

    // Open append-mode handles for the child. Stdio::from moves them into
    // the child's fd table; after spawn the parent holds nothing.
    let stdout_handle = OpenOptions::new().create(true).append(true).open(&stdout_log)?;
    let stderr_handle = OpenOptions::new().create(true).append(true).open(&stderr_log)?;

    std::fs::create_dir_all(cwd)?;

    let mut child = Command::new(program)
        .args(args)
        .envs(env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_handle))
        .stderr(Stdio::from(stderr_handle))
        // New process group: parent exit doesn't signal the child
        .process_group(0)
        .spawn()
        .map_err(|e| EngineError::SpawnFailed {
            name: name.to_string(),
            exit_code: None,
            message: e.to_string(),
        })?;

    let pid = child.id();
    info!(instance = name, pid, "spawned detached child");

    tokio::time::sleep(CRASH_WATCH_DELAY).await;

    match child.try_wait() {
        Ok(Some(status)) => {
            let exit_code = status.code();
            return Err(EngineError::SpawnFailed {
                name: name.to_string(),
                exit_code,
                message: format!(
                    "process exited immediately with code {}",
                    exit_code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
                ),
            });
        }
        Ok(None) => {}
        Err(e) => warn!(instance = name, error = %e, "crash watch poll failed"),
    }

    // Reap the child from a detached thread so it never lingers as a
    // zombie while the supervisor process stays up.
    std::thread::spawn(move || {
        let _ = child.wait();
    });

    Ok(SpawnOutcome {
        pid,
        cmdline,
        stdout_log,
        stderr_log,
    })
}

/// Stop a detached child: terminate the whole tree and write a shutdown
/// marker into the newest stdout log. Returns whether a process was there
/// to stop.
pub async fn stop_detached(
    name: &str,
    pid: u32,
    force: bool,
    timeout: Duration,
    log_dir: &Path,
) -> bool {
    let stopped = process::terminate_tree(pid, force, timeout).await;

    if let Some(log) = latest_log(log_dir, "stdout") {
        let reason = if force { "killed" } else { "stopped" };
        if let Err(e) = write_shutdown_marker(&log, reason) {
            warn!(instance = name, error = %e, "failed to write shutdown marker");
        }
    }

    info!(instance = name, pid, force, "stopped detached child");
    stopped
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
