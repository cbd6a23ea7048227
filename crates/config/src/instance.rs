// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance configuration schema and field validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

fn name_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        let re = regex::Regex::new(r"^[a-z0-9]([a-z0-9_-]*[a-z0-9])?$")
            .expect("static pattern is valid");
        re
    })
}

fn hostname_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        let re = regex::Regex::new(
            r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$",
        )
        .expect("static pattern is valid");
        re
    })
}

/// Which installed server artifact the instance runs.
///
/// Resolution priority: explicit `binary_id`, then `(version, variant)`,
/// then the registry default. `source_url` and `sha256` only affect install.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinarySelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_id: Option<Uuid>,
    /// Version tag (e.g. `b7572`) or `latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Pinned SHA-256 of the downloaded archive, 64 lowercase hex chars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the GGUF model file.
    pub path: PathBuf,
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_threads")]
    pub threads: u32,
}

fn default_context_size() -> u32 {
    4096
}
fn default_batch_size() -> u32 {
    512
}
fn default_threads() -> u32 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_server_timeout")]
    pub timeout: u32,
    /// Parallel request slots.
    #[serde(default = "default_parallel")]
    pub parallel: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8001
}
fn default_server_timeout() -> u32 {
    600
}
fn default_parallel() -> u32 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_server_timeout(),
            parallel: default_parallel(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    #[default]
    Cpu,
    Vulkan,
    Cuda,
    Metal,
    Hip,
}

impl GpuBackend {
    /// Env var selecting the accelerator device for this backend, if any.
    pub fn device_env_var(&self) -> Option<&'static str> {
        match self {
            GpuBackend::Cpu | GpuBackend::Metal => None,
            GpuBackend::Vulkan => Some("GGML_VULKAN_DEVICE"),
            GpuBackend::Cuda => Some("CUDA_VISIBLE_DEVICES"),
            GpuBackend::Hip => Some("HIP_VISIBLE_DEVICES"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuConfig {
    #[serde(default)]
    pub backend: GpuBackend,
    #[serde(default)]
    pub device_id: u32,
    /// Layers offloaded to the accelerator. 0 keeps everything on CPU.
    #[serde(default)]
    pub layers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Http,
    Tcp,
    Script,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    #[serde(default, rename = "type")]
    pub kind: ProbeKind,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body: Option<String>,
    /// Shell command for script probes; `{host}` and `{port}` substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Seconds between checks.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout: u32,
    /// Consecutive failures before the instance counts as unhealthy.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Seconds between probe retries within one check.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Grace period after start during which "loading" is not a failure.
    #[serde(default = "default_start_period")]
    pub start_period: u32,
    /// Jitter fraction applied to restart and check-interval backoff.
    #[serde(default = "default_jitter")]
    pub backoff_jitter: f64,
}

fn default_health_path() -> String {
    "/health".to_string()
}
fn default_expected_status() -> Vec<u16> {
    vec![200]
}
fn default_interval() -> u32 {
    10
}
fn default_probe_timeout() -> u32 {
    5
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> f64 {
    1.0
}
fn default_start_period() -> u32 {
    60
}
fn default_jitter() -> f64 {
    0.1
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Http,
            path: default_health_path(),
            expected_status: default_expected_status(),
            expected_body: None,
            script: None,
            interval: default_interval(),
            timeout: default_probe_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            start_period: default_start_period(),
            backoff_jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
}

fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    5
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> f64 {
    1.0
}
fn default_max_delay() -> f64 {
    300.0
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            backoff_multiplier: default_multiplier(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Stdout log path template; `{name}` is substituted.
    #[serde(default = "default_stdout")]
    pub stdout: String,
    #[serde(default = "default_stderr")]
    pub stderr: String,
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// Rotated files kept per stream.
    #[serde(default = "default_rotation")]
    pub rotation: u32,
}

fn default_stdout() -> String {
    "logs/{name}/stdout.log".to_string()
}
fn default_stderr() -> String {
    "logs/{name}/stderr.log".to_string()
}
fn default_max_size_mb() -> u32 {
    100
}
fn default_rotation() -> u32 {
    5
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            stdout: default_stdout(),
            stderr: default_stderr(),
            max_size_mb: default_max_size_mb(),
            rotation: default_rotation(),
        }
    }
}

/// Complete configuration for one managed inference-server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinarySelector>,
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gpu: GpuConfig,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub logs: LogsConfig,
}

impl InstanceConfig {
    /// Collect every field violation. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if !name_pattern().is_match(&self.name) {
            violations.push(format!(
                "name '{}' must be lowercase alphanumeric with interior '-' or '_'",
                self.name
            ));
        }

        if self
            .model
            .path
            .extension()
            .map(|e| !e.eq_ignore_ascii_case("gguf"))
            .unwrap_or(true)
        {
            violations.push(format!(
                "model.path '{}' must have a .gguf extension",
                self.model.path.display()
            ));
        }
        check_range(&mut violations, "model.context_size", self.model.context_size, 512, 131_072);
        check_range(&mut violations, "model.batch_size", self.model.batch_size, 1, 8192);
        check_range(&mut violations, "model.threads", self.model.threads, 1, 256);

        if !is_valid_host(&self.server.host) {
            violations.push(format!("server.host '{}' is not an IP or hostname", self.server.host));
        }
        if self.server.port < 1024 {
            violations.push(format!("server.port {} must be in 1024..=65535", self.server.port));
        }
        check_range(&mut violations, "server.parallel", self.server.parallel, 1, 64);

        if let Some(binary) = &self.binary {
            if let Some(sha) = &binary.sha256 {
                if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
                {
                    violations.push("binary.sha256 must be 64 lowercase hex characters".to_string());
                }
            }
        }

        let hc = &self.healthcheck;
        check_range(&mut violations, "healthcheck.interval", hc.interval, 1, 3600);
        check_range(&mut violations, "healthcheck.timeout", hc.timeout, 1, 60);
        check_range(&mut violations, "healthcheck.retries", hc.retries, 1, 10);
        check_range_f64(&mut violations, "healthcheck.retry_delay", hc.retry_delay, 0.1, 60.0);
        check_range(&mut violations, "healthcheck.start_period", hc.start_period, 0, 600);
        check_range_f64(&mut violations, "healthcheck.backoff_jitter", hc.backoff_jitter, 0.0, 1.0);
        if hc.kind == ProbeKind::Script && hc.script.as_deref().map_or(true, str::is_empty) {
            violations.push("healthcheck.script is required for script probes".to_string());
        }

        let rp = &self.restart_policy;
        check_range(&mut violations, "restart_policy.max_retries", rp.max_retries, 0, 100);
        check_range_f64(&mut violations, "restart_policy.backoff_multiplier", rp.backoff_multiplier, 1.0, 10.0);
        check_range_f64(&mut violations, "restart_policy.initial_delay", rp.initial_delay, 0.1, 60.0);
        check_range_f64(&mut violations, "restart_policy.max_delay", rp.max_delay, 1.0, 3600.0);

        check_range(&mut violations, "logs.max_size_mb", self.logs.max_size_mb, 1, 10_000);
        check_range(&mut violations, "logs.rotation", self.logs.rotation, 1, 100);

        violations
    }

    /// Environment for the child process: configured `env` plus the
    /// per-backend accelerator device selector.
    pub fn env_vars(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        if let Some(var) = self.gpu.backend.device_env_var() {
            env.insert(var.to_string(), self.gpu.device_id.to_string());
        }
        env
    }

    /// Log file paths with `{name}` substituted, relative to the project root.
    pub fn log_paths(&self) -> (PathBuf, PathBuf) {
        (
            PathBuf::from(self.logs.stdout.replace("{name}", &self.name)),
            PathBuf::from(self.logs.stderr.replace("{name}", &self.name)),
        )
    }
}

fn check_range(violations: &mut Vec<String>, field: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        violations.push(format!("{field} {value} must be in {min}..={max}"));
    }
}

fn check_range_f64(violations: &mut Vec<String>, field: &str, value: f64, min: f64, max: f64) {
    if !(min..=max).contains(&value) {
        violations.push(format!("{field} {value} must be in {min}..={max}"));
    }
}

fn is_valid_host(host: &str) -> bool {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    host == "localhost" || hostname_pattern().is_match(host)
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
