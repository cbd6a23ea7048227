// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon file logging

use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Rotate the daemon log to `.1` once it grows past this size.
pub const MAX_LOG_BYTES: u64 = 20 * 1024 * 1024;

/// Rename an oversized log aside so the daemon starts on a fresh file.
pub fn rotate_log_if_needed(path: &Path, max_bytes: u64) {
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    if meta.len() < max_bytes {
        return;
    }
    let rotated = path.with_extension("log.1");
    let _ = std::fs::remove_file(&rotated);
    let _ = std::fs::rename(path, &rotated);
}

/// Append a plain-text startup line before the subscriber exists, so the
/// CLI can find daemon start boundaries even if logging setup fails.
pub fn write_startup_marker(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(
        file,
        "---- herdd starting (pid {}) ----",
        std::process::id()
    )
}

/// Install the file-backed subscriber. The returned guard must live as
/// long as the process; dropping it stops the background writer.
pub fn init(path: &Path) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
