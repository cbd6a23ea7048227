// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-table inspection and classification
//!
//! Everything here reports classifications rather than failing: a missing
//! or unreadable process is data the reconciler acts on, not an error. The
//! only fallible operation is tree termination, which reports IO problems.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Process age after which a matching process counts as stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Classification of a recorded pid against the live process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCheck {
    /// Process exists, is not a zombie, and its command line matches.
    Valid,
    /// Process does not exist.
    Missing,
    /// Pid exists but belongs to an unrelated process (pid reuse).
    PidMismatch,
    /// Process is a zombie.
    Zombie,
    /// Process exists and matches but has not been seen recently.
    Stale,
}

/// Result of classifying one pid.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub check: ProcessCheck,
    pub pid: u32,
    /// Observed command line; `None` when unreadable.
    pub cmdline: Option<String>,
    pub message: String,
}

/// An unmanaged process matching the server binary pattern.
#[derive(Debug, Clone)]
pub struct OrphanProcess {
    pub pid: u32,
    pub cmdline: String,
}

struct ProcSnapshot {
    cmdline: Option<String>,
    zombie: bool,
}

/// Read a process's state; `None` means it does not exist.
///
/// Access-denied is treated as "exists, command line unknown".
fn snapshot(pid: u32) -> Option<ProcSnapshot> {
    let proc = match procfs::process::Process::new(pid as i32) {
        Ok(proc) => proc,
        Err(procfs::ProcError::NotFound(_)) => return None,
        Err(procfs::ProcError::PermissionDenied(_)) => {
            return Some(ProcSnapshot {
                cmdline: None,
                zombie: false,
            })
        }
        Err(e) => {
            debug!(pid, error = %e, "process lookup failed");
            return None;
        }
    };

    let zombie = proc.stat().map(|s| s.state == 'Z').unwrap_or(false);
    let cmdline = proc
        .cmdline()
        .ok()
        .filter(|args| !args.is_empty())
        .map(|args| args.join(" "));

    Some(ProcSnapshot { cmdline, zombie })
}

/// Whether a process with this pid exists (EPERM counts as alive).
pub fn pid_alive(pid: u32) -> bool {
    match i32::try_from(pid) {
        Ok(raw) => matches!(
            kill(Pid::from_raw(raw), None),
            Ok(()) | Err(nix::errno::Errno::EPERM)
        ),
        Err(_) => false,
    }
}

/// Whether a command line looks like the managed server binary.
///
/// Substring test: the recorded pattern (usually the binary file name) must
/// appear in the observed command line, case-insensitively.
pub fn cmdline_matches(cmdline: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    cmdline.to_lowercase().contains(&pattern.to_lowercase())
}

/// Classify a recorded pid against the live process table.
///
/// `last_seen_age` is the time since the reconciler last saw the process;
/// `None` disables the staleness check.
pub fn classify(
    pid: u32,
    expected_pattern: &str,
    last_seen_age: Option<Duration>,
    stale_after: Duration,
) -> ProcessReport {
    let Some(snap) = snapshot(pid) else {
        return ProcessReport {
            check: ProcessCheck::Missing,
            pid,
            cmdline: None,
            message: format!("process {pid} does not exist"),
        };
    };

    if snap.zombie {
        return ProcessReport {
            check: ProcessCheck::Zombie,
            pid,
            cmdline: snap.cmdline,
            message: format!("process {pid} is a zombie"),
        };
    }

    if let Some(cmdline) = &snap.cmdline {
        if !cmdline_matches(cmdline, expected_pattern) {
            let mut shown = cmdline.clone();
            shown.truncate(120);
            return ProcessReport {
                check: ProcessCheck::PidMismatch,
                pid,
                cmdline: snap.cmdline.clone(),
                message: format!("pid {pid} now belongs to a different process: {shown}"),
            };
        }
    }

    if let Some(age) = last_seen_age {
        if age > stale_after {
            return ProcessReport {
                check: ProcessCheck::Stale,
                pid,
                cmdline: snap.cmdline,
                message: format!("process {pid} not seen for {}s", age.as_secs()),
            };
        }
    }

    ProcessReport {
        check: ProcessCheck::Valid,
        pid,
        cmdline: snap.cmdline,
        message: format!("process {pid} is running"),
    }
}

/// Scan the whole process table for server processes not in `known_pids`.
pub fn find_orphans(pattern: &str, known_pids: &HashSet<u32>) -> Vec<OrphanProcess> {
    let Ok(processes) = procfs::process::all_processes() else {
        warn!("unable to enumerate processes for orphan scan");
        return Vec::new();
    };

    let mut orphans = Vec::new();
    for proc in processes.flatten() {
        let pid = proc.pid() as u32;
        if known_pids.contains(&pid) {
            continue;
        }
        let Ok(args) = proc.cmdline() else { continue };
        if args.is_empty() {
            continue;
        }
        let cmdline = args.join(" ");
        if cmdline_matches(&cmdline, pattern) && !pattern.is_empty() {
            orphans.push(OrphanProcess { pid, cmdline });
        }
    }
    orphans
}

/// Direct and transitive children of a pid, via ppid chains.
fn descendants(root: u32) -> Vec<u32> {
    let Ok(processes) = procfs::process::all_processes() else {
        return Vec::new();
    };

    let pairs: Vec<(u32, u32)> = processes
        .flatten()
        .filter_map(|p| p.stat().ok().map(|s| (s.pid as u32, s.ppid as u32)))
        .collect();

    let mut result = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (pid, ppid) in &pairs {
            if *ppid == parent && !result.contains(pid) {
                result.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    result
}

fn send_signal(pid: u32, signal: Signal) {
    if let Ok(raw) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(raw), signal);
    }
}

/// Terminate a process and all its descendants.
///
/// Graceful mode sends SIGTERM to the whole tree, waits up to `timeout`,
/// then SIGKILLs whatever is left. Force mode goes straight to SIGKILL.
/// Returns `false` when the root process was already gone.
pub async fn terminate_tree(pid: u32, force: bool, timeout: Duration) -> bool {
    if !pid_alive(pid) {
        debug!(pid, "process already gone");
        return false;
    }

    let children = descendants(pid);
    let mut targets = vec![pid];
    targets.extend(children);

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    for target in &targets {
        send_signal(*target, signal);
    }

    if !force {
        let deadline = Instant::now() + timeout;
        loop {
            targets.retain(|t| pid_alive(*t));
            if targets.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        for leftover in &targets {
            warn!(pid = leftover, "still alive after graceful stop, killing");
            send_signal(*leftover, Signal::SIGKILL);
        }
    }

    true
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
