// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container engine adapter
//!
//! Drives the engine CLI (`docker` by default, `HERD_CONTAINER_ENGINE` to
//! override, podman-compatible). Containers are created detached and never
//! auto-removed; cleanup always runs after the log stream finishes so a
//! crashed run leaves nothing behind.

use crate::subprocess::{run_with_timeout, ENGINE_COMMAND_TIMEOUT, IMAGE_PULL_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Env var naming the engine binary.
pub const ENGINE_ENV: &str = "HERD_CONTAINER_ENGINE";

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("image '{image}' not found and pull failed: {message}")]
    ImageNotFound { image: String, message: String },
    #[error("container '{name}' failed: {message}")]
    Failed { name: String, message: String },
    #[error("container '{name}' exceeded the {}s wall-clock limit", timeout.as_secs())]
    Timeout { name: String, timeout: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container network attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    None,
    Bridge,
}

impl NetworkMode {
    pub fn as_flag(&self) -> &'static str {
        match self {
            NetworkMode::None => "none",
            NetworkMode::Bridge => "bridge",
        }
    }
}

/// A bind mount into the container.
#[derive(Debug, Clone)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to create one container.
///
/// The security/resource fields are populated by the sandbox envelope;
/// this adapter only translates them to engine flags.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    pub workdir: Option<String>,
    pub network: NetworkMode,
    pub cap_drop: Vec<String>,
    pub read_only_root: bool,
    /// Engine-format memory limit, e.g. `4g`.
    pub memory_limit: Option<String>,
    pub cpus: Option<f64>,
    pub pids_limit: Option<u32>,
}

/// Handle to the container engine CLI.
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    binary: String,
}

impl ContainerEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Engine from `HERD_CONTAINER_ENGINE`, defaulting to `docker`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(ENGINE_ENV).unwrap_or_else(|_| "docker".to_string()))
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    /// Make sure `image` is present locally, pulling it on a miss.
    pub async fn ensure_image(&self, image: &str) -> Result<(), ContainerError> {
        let inspect = run_with_timeout(
            self.command(&["image".into(), "inspect".into(), image.into()]),
            ENGINE_COMMAND_TIMEOUT,
            "image inspect",
        )
        .await;

        if matches!(&inspect, Ok(output) if output.status.success()) {
            debug!(image, "image present");
            return Ok(());
        }

        info!(image, "image missing, pulling");
        let pull = run_with_timeout(
            self.command(&["pull".into(), image.into()]),
            IMAGE_PULL_TIMEOUT,
            "image pull",
        )
        .await
        .map_err(|message| ContainerError::ImageNotFound {
            image: image.to_string(),
            message,
        })?;

        if !pull.status.success() {
            return Err(ContainerError::ImageNotFound {
                image: image.to_string(),
                message: String::from_utf8_lossy(&pull.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Arguments for `create` given a spec. Pure, for testability.
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];

        args.push("--network".to_string());
        args.push(spec.network.as_flag().to_string());

        for cap in &spec.cap_drop {
            args.push("--cap-drop".to_string());
            args.push(cap.clone());
        }
        if spec.read_only_root {
            args.push("--read-only".to_string());
        }
        if let Some(memory) = &spec.memory_limit {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
        if let Some(cpus) = spec.cpus {
            args.push("--cpus".to_string());
            args.push(format!("{cpus}"));
        }
        if let Some(pids) = spec.pids_limit {
            args.push("--pids-limit".to_string());
            args.push(pids.to_string());
        }

        for mount in &spec.mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.push("-v".to_string());
            args.push(format!("{}:{}:{}", mount.source.display(), mount.target, mode));
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        if let Some(workdir) = &spec.workdir {
            args.push("--workdir".to_string());
            args.push(workdir.clone());
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    /// Create and start the container, streaming combined stdout/stderr
    /// line-wise into `tx` (bounded; a slow consumer backpressures the
    /// reader). Returns the exit code. The container is removed in every
    /// outcome, including timeout.
    pub async fn run(
        &self,
        spec: &ContainerSpec,
        timeout: Duration,
        tx: mpsc::Sender<String>,
    ) -> Result<i64, ContainerError> {
        let result = self.run_inner(spec, timeout, tx).await;
        self.remove(&spec.name).await;
        result
    }

    async fn run_inner(
        &self,
        spec: &ContainerSpec,
        timeout: Duration,
        tx: mpsc::Sender<String>,
    ) -> Result<i64, ContainerError> {
        let name = &spec.name;

        let create = run_with_timeout(
            self.command(&Self::create_args(spec)),
            ENGINE_COMMAND_TIMEOUT,
            "container create",
        )
        .await
        .map_err(|message| ContainerError::Failed {
            name: name.clone(),
            message,
        })?;
        if !create.status.success() {
            return Err(ContainerError::Failed {
                name: name.clone(),
                message: String::from_utf8_lossy(&create.stderr).trim().to_string(),
            });
        }

        let start = run_with_timeout(
            self.command(&["start".into(), name.clone()]),
            ENGINE_COMMAND_TIMEOUT,
            "container start",
        )
        .await
        .map_err(|message| ContainerError::Failed {
            name: name.clone(),
            message,
        })?;
        if !start.status.success() {
            return Err(ContainerError::Failed {
                name: name.clone(),
                message: String::from_utf8_lossy(&start.stderr).trim().to_string(),
            });
        }

        info!(container = %name, image = %spec.image, "container started");

        // Follow combined output; the child ends when the container exits.
        let mut logs_cmd = self.command(&["logs".into(), "--follow".into(), name.clone()]);
        logs_cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        let mut logs_child = logs_cmd.spawn()?;

        let stdout = logs_child.stdout.take();
        let stderr = logs_child.stderr.take();
        let stdout_task = stdout.map(|s| tokio::spawn(forward_lines(s, tx.clone())));
        let stderr_task = stderr.map(|s| tokio::spawn(forward_lines(s, tx.clone())));

        let waited = tokio::time::timeout(
            timeout,
            run_with_timeout(
                self.command(&["wait".into(), name.clone()]),
                // Outer timeout governs; the inner one just needs to be larger.
                timeout + Duration::from_secs(5),
                "container wait",
            ),
        )
        .await;

        match waited {
            Ok(Ok(output)) => {
                let code: i64 = String::from_utf8_lossy(&output.stdout)
                    .trim()
                    .parse()
                    .unwrap_or(-1);

                if let Some(task) = stdout_task {
                    let _ = task.await;
                }
                if let Some(task) = stderr_task {
                    let _ = task.await;
                }
                let _ = logs_child.wait().await;

                let _ = tx.send(format!("[container exited with code {code}]\n")).await;
                info!(container = %name, code, "container finished");
                Ok(code)
            }
            Ok(Err(message)) => Err(ContainerError::Failed {
                name: name.clone(),
                message,
            }),
            Err(_) => {
                let _ = tx
                    .send(format!("[container timed out after {}s]\n", timeout.as_secs()))
                    .await;
                warn!(container = %name, "wall-clock timeout, stopping container");
                self.stop(name, Duration::from_secs(5)).await;
                Err(ContainerError::Timeout {
                    name: name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Graceful stop; falls back to kill.
    pub async fn stop(&self, name: &str, timeout: Duration) {
        let stop = run_with_timeout(
            self.command(&[
                "stop".into(),
                "-t".into(),
                timeout.as_secs().to_string(),
                name.into(),
            ]),
            ENGINE_COMMAND_TIMEOUT,
            "container stop",
        )
        .await;

        let stopped = matches!(&stop, Ok(output) if output.status.success());
        if !stopped {
            warn!(container = %name, "graceful stop failed, killing");
            let _ = run_with_timeout(
                self.command(&["kill".into(), name.into()]),
                ENGINE_COMMAND_TIMEOUT,
                "container kill",
            )
            .await;
        }
    }

    /// Force-remove the container; a not-found error is fine.
    pub async fn remove(&self, name: &str) {
        let _ = run_with_timeout(
            self.command(&["rm".into(), "-f".into(), name.into()]),
            ENGINE_COMMAND_TIMEOUT,
            "container rm",
        )
        .await;
    }
}

/// Forward a byte stream into the channel line-wise, decoding UTF-8 with
/// replacement.
async fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut segments = BufReader::new(stream).split(b'\n');
    while let Ok(Some(segment)) = segments.next_segment().await {
        let mut line = String::from_utf8_lossy(&segment).into_owned();
        line.push('\n');
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
