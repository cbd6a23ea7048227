// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process file locks
//!
//! One lock file per logical name under the locks directory, containing
//! `pid=<n>`, `created=<unix_float>` and `operation=<label>`. Lock files are
//! the only cross-process synchronization primitive; staleness (dead owner
//! or old age) makes a lock acquirable again after a crash.

use crate::error::StorageError;
use herd_core::epoch_secs;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default total time to wait for a lock.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry interval while waiting.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// A lock older than this is stale regardless of its owner.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Parsed contents of a lock file.
#[derive(Debug, Clone, PartialEq)]
pub struct LockInfo {
    pub pid: u32,
    pub created: f64,
    pub operation: String,
}

impl LockInfo {
    fn parse(content: &str) -> Option<Self> {
        let mut pid = None;
        let mut created = None;
        let mut operation = String::new();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "pid" => pid = value.trim().parse().ok(),
                "created" => created = value.trim().parse().ok(),
                "operation" => operation = value.trim().to_string(),
                _ => {}
            }
        }
        Some(Self {
            pid: pid?,
            created: created?,
            operation,
        })
    }

    fn render(&self) -> String {
        format!(
            "pid={}\ncreated={}\noperation={}\n",
            self.pid, self.created, self.operation
        )
    }
}

fn pid_alive(pid: u32) -> bool {
    match i32::try_from(pid) {
        // EPERM still means the process exists
        Ok(pid) => matches!(
            kill(Pid::from_raw(pid), None),
            Ok(()) | Err(nix::errno::Errno::EPERM)
        ),
        Err(_) => false,
    }
}

/// Manages per-name lock files for this process.
#[derive(Clone, Debug)]
pub struct LockManager {
    lock_dir: PathBuf,
    held: Arc<Mutex<HashMap<String, PathBuf>>>,
    stale_after: Duration,
}

impl LockManager {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            held: Arc::new(Mutex::new(HashMap::new())),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.lock_dir.join(format!("{safe}.lock"))
    }

    /// Read lock info for a name, if a parseable lock file exists.
    pub fn info(&self, name: &str) -> Option<LockInfo> {
        let content = std::fs::read_to_string(self.lock_path(name)).ok()?;
        LockInfo::parse(&content)
    }

    fn is_stale(&self, info: Option<&LockInfo>) -> bool {
        let Some(info) = info else {
            // Unreadable or unparseable lock file
            return true;
        };
        if !pid_alive(info.pid) {
            debug!(pid = info.pid, "lock owner no longer exists");
            return true;
        }
        epoch_secs() - info.created > self.stale_after.as_secs_f64()
    }

    /// Whether a live (non-stale) lock exists for the name.
    pub fn is_locked(&self, name: &str) -> bool {
        let path = self.lock_path(name);
        if !path.exists() {
            return false;
        }
        !self.is_stale(self.info(name).as_ref())
    }

    /// Acquire the lock, waiting up to `timeout`.
    ///
    /// Re-entrant within one manager: acquiring a name this manager already
    /// holds succeeds immediately. Returns a guard that releases on drop.
    pub fn acquire(
        &self,
        name: &str,
        operation: &str,
        timeout: Duration,
    ) -> Result<LockGuard, StorageError> {
        self.acquire_with(name, operation, timeout, DEFAULT_RETRY_INTERVAL)
    }

    pub fn acquire_with(
        &self,
        name: &str,
        operation: &str,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<LockGuard, StorageError> {
        std::fs::create_dir_all(&self.lock_dir)?;
        let path = self.lock_path(name);
        let start = std::time::Instant::now();

        loop {
            if self.held.lock().contains_key(name) {
                debug!(name, "already holding lock");
                return Ok(LockGuard {
                    manager: self.clone(),
                    name: name.to_string(),
                    released: false,
                });
            }

            // create_new fails if the file appeared between check and write
            let info = LockInfo {
                pid: std::process::id(),
                created: epoch_secs(),
                operation: operation.to_string(),
            };
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    file.write_all(info.render().as_bytes())?;
                    self.held.lock().insert(name.to_string(), path.clone());
                    debug!(name, operation, "acquired lock");
                    return Ok(LockGuard {
                        manager: self.clone(),
                        name: name.to_string(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let existing = self.info(name);
                    if self.is_stale(existing.as_ref()) {
                        info!(name, "removing stale lock");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if start.elapsed() >= timeout {
                        return Err(StorageError::LockTimeout {
                            name: name.to_string(),
                            elapsed_secs: start.elapsed().as_secs_f64(),
                            owner_pid: existing.as_ref().map(|i| i.pid),
                            operation: existing
                                .map(|i| i.operation)
                                .unwrap_or_else(|| "unknown".to_string()),
                        });
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release a held lock. Verifies the recorded owner pid first.
    pub fn release(&self, name: &str) -> Result<bool, StorageError> {
        let Some(path) = self.held.lock().remove(name) else {
            debug!(name, "not holding lock");
            return Ok(false);
        };

        if let Some(info) = self.info(name) {
            if info.pid != std::process::id() {
                warn!(name, owner_pid = info.pid, "lock owned by different pid");
                return Err(StorageError::LockNotOwned {
                    name: name.to_string(),
                    owner_pid: info.pid,
                });
            }
        }

        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        debug!(name, "released lock");
        Ok(true)
    }

    /// Remove every stale lock file in the lock directory.
    pub fn cleanup_stale(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.lock_dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            let info = std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| LockInfo::parse(&c));
            if self.is_stale(info.as_ref()) {
                if std::fs::remove_file(&path).is_ok() {
                    info!(path = %path.display(), "removed stale lock");
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// RAII guard releasing a single lock on drop.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    name: String,
    released: bool,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release explicitly, surfacing errors drop would swallow.
    pub fn release(mut self) -> Result<(), StorageError> {
        self.released = true;
        self.manager.release(&self.name).map(|_| ())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.manager.release(&self.name) {
                warn!(name = %self.name, error = %e, "failed to release lock on drop");
            }
        }
    }
}

/// Holds a set of locks, acquired in sorted order to prevent deadlock.
pub struct LockSet {
    // Reverse-release happens via drop order (Vec drops front-to-back, so
    // guards are stored in reverse acquisition order).
    guards: Vec<LockGuard>,
}

impl LockSet {
    /// Acquire all `names` in sorted order; on failure, already-acquired
    /// locks are released (in reverse) before the error is returned.
    pub fn acquire(
        manager: &LockManager,
        names: &[&str],
        operation: &str,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let mut sorted: Vec<&str> = names.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for name in sorted {
            guards.push(manager.acquire(name, operation, timeout)?);
        }
        guards.reverse();
        Ok(Self { guards })
    }

    pub fn names(&self) -> Vec<&str> {
        self.guards.iter().map(|g| g.name()).collect()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
