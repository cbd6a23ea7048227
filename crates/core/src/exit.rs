// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed exit-code table for tooling consumers
//!
//! Ranges are stable: 0 success, 1-9 general, 10-19 configuration, 20-29
//! instance state, 30-39 process/lock, 40-49 network/port/health, 50-59
//! binary/model, 60-69 daemon. An unclassified failure maps to 1.

/// Process exit codes used by the `herd` CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    // General (1-9)
    GeneralError = 1,
    UsageError = 2,
    Interrupted = 3,
    Timeout = 4,
    PermissionDenied = 5,

    // Configuration (10-19)
    ConfigNotFound = 10,
    ConfigInvalid = 11,
    ConfigParseError = 12,
    InstanceNotFound = 13,
    InstanceExists = 14,

    // Instance state (20-29)
    InstanceNotRunning = 20,
    InstanceAlreadyRunning = 21,
    InstanceUnhealthy = 22,

    // Process / lock (30-39)
    SpawnFailed = 30,
    StopFailed = 31,
    ProcessNotFound = 32,
    LockTimeout = 33,
    StateCorrupt = 34,

    // Network / port / health (40-49)
    PortInUse = 40,
    PortUnavailable = 41,
    HealthCheckFailed = 42,
    ConnectionRefused = 43,

    // Binary / model (50-59)
    BinaryNotFound = 50,
    BinaryInvalid = 51,
    DownloadFailed = 52,
    ChecksumMismatch = 53,
    ModelNotFound = 54,

    // Daemon (60-69)
    DaemonNotRunning = 60,
    DaemonAlreadyRunning = 61,
    DaemonStartFailed = 62,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether the failure is worth retrying without operator intervention.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ExitCode::Timeout | ExitCode::LockTimeout | ExitCode::ConnectionRefused
        )
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.code()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
#[path = "exit_tests.rs"]
mod tests;
