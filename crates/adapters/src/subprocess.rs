// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for git diff/stat/check invocations.
pub const GIT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for git apply/revert invocations.
pub const GIT_APPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for container engine management commands
/// (create/start/stop/rm/inspect).
pub const ENGINE_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for image pulls.
pub const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default timeout for one verification step (lint/tests/build).
pub const VERIFY_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child process
/// is killed automatically if the timeout elapses (via the tokio `Child`
/// drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Run a shell command line (`sh -c`) with a timeout.
pub async fn run_shell_with_timeout(
    command_line: &str,
    cwd: Option<&std::path::Path>,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    run_with_timeout(cmd, timeout, description).await
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
