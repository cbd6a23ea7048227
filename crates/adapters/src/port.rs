// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP port inspection
//!
//! Bind-checks with address reuse, listening-socket owner lookup through
//! the kernel's TCP tables, cross-referencing against runtime records, and
//! wait-for-listen / wait-for-release polling.

use herd_core::RuntimeRecord;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

/// The process listening on a port.
#[derive(Debug, Clone)]
pub struct PortOwner {
    pub pid: u32,
    /// Command-line snippet, when the owning process is queryable.
    pub cmdline: Option<String>,
}

/// Everything known about a port's status.
#[derive(Debug, Clone)]
pub struct PortCheck {
    pub port: u16,
    pub free: bool,
    pub owner: Option<PortOwner>,
    /// Name of the managed instance that owns the port, when the owner pid
    /// and port match a runtime record. Legitimate during restart.
    pub owned_by_instance: Option<String>,
}

/// A port wanted by one instance but held by someone else.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct PortConflict {
    pub port: u16,
    pub reason: String,
    pub owner_pid: Option<u32>,
    pub owner_instance: Option<String>,
    /// A free port the caller could use instead, when one was found.
    pub suggested: Option<u16>,
}

fn parse_addr(host: &str, port: u16) -> Option<SocketAddr> {
    let ip: IpAddr = if host == "localhost" {
        IpAddr::from([127, 0, 0, 1])
    } else {
        host.parse().ok()?
    };
    Some(SocketAddr::new(ip, port))
}

/// Whether a TCP socket can bind `(host, port)` right now.
///
/// Binds with SO_REUSEADDR and releases immediately. Unresolvable hosts
/// count as unavailable.
pub fn is_free(host: &str, port: u16) -> bool {
    let Some(addr) = parse_addr(host, port) else {
        return false;
    };
    let socket = match if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    } {
        Ok(socket) => socket,
        Err(_) => return false,
    };
    if socket.set_reuseaddr(true).is_err() {
        return false;
    }
    socket.bind(addr).is_ok()
}

/// Find the pid listening on `port` via the kernel TCP tables.
///
/// Requires permission to read the owning process's fd table; on
/// permission failure the owner is reported with an unknown command line,
/// or not at all.
pub fn owner(port: u16) -> Option<PortOwner> {
    let mut entries = Vec::new();
    if let Ok(tcp) = procfs::net::tcp() {
        entries.extend(tcp);
    }
    if let Ok(tcp6) = procfs::net::tcp6() {
        entries.extend(tcp6);
    }

    let inode = entries.iter().find_map(|entry| {
        (entry.state == procfs::net::TcpState::Listen && entry.local_address.port() == port)
            .then_some(entry.inode)
    })?;

    let processes = match procfs::process::all_processes() {
        Ok(processes) => processes,
        Err(e) => {
            warn!(error = %e, "cannot enumerate processes for port owner lookup");
            return None;
        }
    };

    for proc in processes.flatten() {
        let Ok(fds) = proc.fd() else { continue };
        for fd in fds.flatten() {
            if let procfs::process::FDTarget::Socket(fd_inode) = fd.target {
                if fd_inode == inode {
                    let cmdline = proc
                        .cmdline()
                        .ok()
                        .filter(|args| !args.is_empty())
                        .map(|args| {
                            let mut joined = args.join(" ");
                            joined.truncate(200);
                            joined
                        });
                    return Some(PortOwner {
                        pid: proc.pid() as u32,
                        cmdline,
                    });
                }
            }
        }
    }

    debug!(port, inode, "listening socket found but owner not queryable");
    None
}

/// Inspect a port and cross-reference the owner against runtime records.
pub fn inspect(host: &str, port: u16, records: &[RuntimeRecord]) -> PortCheck {
    if is_free(host, port) {
        return PortCheck {
            port,
            free: true,
            owner: None,
            owned_by_instance: None,
        };
    }

    let owner = owner(port);
    let owned_by_instance = owner.as_ref().and_then(|o| {
        records
            .iter()
            .find(|r| r.pid == Some(o.pid) && r.port == Some(port))
            .map(|r| r.name.clone())
    });

    PortCheck {
        port,
        free: false,
        owner,
        owned_by_instance,
    }
}

/// Validate that `instance` may use the port.
///
/// Allowed when the port is free or already owned by the same instance
/// (legitimate reuse during restart). Otherwise returns a conflict with a
/// human-readable reason and, when possible, a suggested alternative.
pub fn validate_for_instance(
    host: &str,
    port: u16,
    instance: &str,
    records: &[RuntimeRecord],
) -> Result<(), PortConflict> {
    let check = inspect(host, port, records);

    if check.free {
        return Ok(());
    }
    if check.owned_by_instance.as_deref() == Some(instance) {
        return Ok(());
    }

    let reason = match (&check.owned_by_instance, &check.owner) {
        (Some(other), _) => format!("port {port} is in use by instance '{other}'"),
        (None, Some(owner)) => match &owner.cmdline {
            Some(cmdline) => {
                format!("port {port} is in use by pid {} ({})", owner.pid, cmdline)
            }
            None => format!("port {port} is in use by pid {}", owner.pid),
        },
        (None, None) => format!("port {port} is in use by an unknown process"),
    };

    let used: HashSet<u16> = records.iter().filter_map(|r| r.port).collect();
    let suggested = find_free(host, port.saturating_add(1), port.saturating_add(100), &used);

    Err(PortConflict {
        port,
        reason,
        owner_pid: check.owner.map(|o| o.pid),
        owner_instance: check.owned_by_instance,
        suggested,
    })
}

/// First free port in `[start, end]`, skipping `exclude`.
pub fn find_free(host: &str, start: u16, end: u16, exclude: &HashSet<u16>) -> Option<u16> {
    (start..=end).find(|port| !exclude.contains(port) && is_free(host, *port))
}

/// Preferred port if usable, else the first free port in `range`, skipping
/// ports already recorded by any instance.
pub fn suggest(
    host: &str,
    instance: &str,
    preferred: Option<u16>,
    range: (u16, u16),
    records: &[RuntimeRecord],
) -> Option<u16> {
    if let Some(preferred) = preferred {
        if validate_for_instance(host, preferred, instance, records).is_ok() {
            return Some(preferred);
        }
    }
    let used: HashSet<u16> = records.iter().filter_map(|r| r.port).collect();
    find_free(host, range.0, range.1, &used)
}

/// Poll until something is listening on `(host, port)` or the deadline passes.
pub async fn wait_for_listen(host: &str, port: u16, timeout: Duration, interval: Duration) -> bool {
    let Some(addr) = parse_addr(host, port) else {
        return false;
    };
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(addr))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
        {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Poll until the port can be bound again or the deadline passes.
pub async fn wait_for_release(host: &str, port: u16, timeout: Duration, interval: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if is_free(host, port) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
