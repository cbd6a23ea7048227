// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable health probes
//!
//! Three probe variants behind one `check(host, port)` operation: HTTP GET
//! against a path, a bare TCP connect, or a shell script with `{host}` and
//! `{port}` placeholders. Probe outcomes are data; the retry wrapper keeps
//! the first success or the last failure.

use crate::subprocess::run_shell_with_timeout;
use herd_config::{HealthcheckConfig, ProbeKind};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// Common probe settings.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub timeout: Duration,
    /// Extra attempts after the first.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Probe variant. Constructed from configuration by [`HealthProbe::from_config`].
#[derive(Debug, Clone)]
pub enum Probe {
    Http {
        path: String,
        expected_status: Vec<u16>,
        expected_body: Option<String>,
    },
    Tcp,
    Script {
        command: String,
    },
}

/// Result of one probe check.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub success: bool,
    pub elapsed_ms: f64,
    /// HTTP status or script exit code.
    pub status_code: Option<i32>,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ProbeOutcome {
    fn failure(elapsed_ms: f64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            elapsed_ms,
            status_code: None,
            message: message.into(),
            details: None,
        }
    }
}

/// A configured probe ready to run.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    probe: Probe,
    settings: ProbeSettings,
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new(probe: Probe, settings: ProbeSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_default();
        Self {
            probe,
            settings,
            client,
        }
    }

    /// Build the probe described by an instance's healthcheck section.
    pub fn from_config(config: &HealthcheckConfig) -> Self {
        let probe = match config.kind {
            ProbeKind::Http => Probe::Http {
                path: config.path.clone(),
                expected_status: config.expected_status.clone(),
                expected_body: config.expected_body.clone(),
            },
            ProbeKind::Tcp => Probe::Tcp,
            ProbeKind::Script => Probe::Script {
                command: config.script.clone().unwrap_or_default(),
            },
        };
        Self::new(
            probe,
            ProbeSettings {
                timeout: Duration::from_secs(config.timeout as u64),
                retries: config.retries.saturating_sub(1),
                retry_delay: Duration::from_secs_f64(config.retry_delay),
            },
        )
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Run the probe once.
    pub async fn check(&self, host: &str, port: u16) -> ProbeOutcome {
        match &self.probe {
            Probe::Http {
                path,
                expected_status,
                expected_body,
            } => self.check_http(host, port, path, expected_status, expected_body.as_deref()).await,
            Probe::Tcp => self.check_tcp(host, port).await,
            Probe::Script { command } => self.check_script(host, port, command).await,
        }
    }

    /// Run the probe up to `retries + 1` times; first success wins,
    /// otherwise the last failure is returned.
    pub async fn check_with_retry(&self, host: &str, port: u16) -> ProbeOutcome {
        let mut last = None;
        for attempt in 0..=self.settings.retries {
            let outcome = self.check(host, port).await;
            if outcome.success {
                return outcome;
            }
            debug!(host, port, attempt, message = %outcome.message, "probe attempt failed");
            last = Some(outcome);
            if attempt < self.settings.retries {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }
        last.unwrap_or_else(|| ProbeOutcome::failure(0.0, "no check performed"))
    }

    async fn check_http(
        &self,
        host: &str,
        port: u16,
        path: &str,
        expected_status: &[u16],
        expected_body: Option<&str>,
    ) -> ProbeOutcome {
        let url = format!("http://{host}:{port}{path}");
        let start = Instant::now();

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                let message = if e.is_timeout() {
                    format!("timeout after {}s", self.settings.timeout.as_secs())
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                return ProbeOutcome::failure(elapsed, message);
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        if !expected_status.contains(&status) {
            return ProbeOutcome {
                success: false,
                elapsed_ms: elapsed,
                status_code: Some(status as i32),
                message: format!("unexpected status: {status}"),
                details: None,
            };
        }

        if let Some(needle) = expected_body {
            if !body.contains(needle) {
                return ProbeOutcome {
                    success: false,
                    elapsed_ms: elapsed,
                    status_code: Some(status as i32),
                    message: format!("expected body substring not found: {needle}"),
                    details: None,
                };
            }
        }

        ProbeOutcome {
            success: true,
            elapsed_ms: elapsed,
            status_code: Some(status as i32),
            message: "OK".to_string(),
            details: Some(json!({ "url": url })),
        }
    }

    async fn check_tcp(&self, host: &str, port: u16) -> ProbeOutcome {
        let start = Instant::now();
        let addr = format!("{host}:{port}");
        match tokio::time::timeout(self.settings.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => ProbeOutcome {
                success: true,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                status_code: None,
                message: "tcp connection successful".to_string(),
                details: Some(json!({ "host": host, "port": port })),
            },
            Ok(Err(e)) => ProbeOutcome::failure(
                start.elapsed().as_secs_f64() * 1000.0,
                format!("tcp connection failed: {e}"),
            ),
            Err(_) => ProbeOutcome::failure(
                start.elapsed().as_secs_f64() * 1000.0,
                format!("tcp timeout after {}s", self.settings.timeout.as_secs()),
            ),
        }
    }

    async fn check_script(&self, host: &str, port: u16, command: &str) -> ProbeOutcome {
        let rendered = command
            .replace("{host}", host)
            .replace("{port}", &port.to_string());
        let start = Instant::now();

        match run_shell_with_timeout(&rendered, None, self.settings.timeout, "health script").await
        {
            Ok(output) => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                let code = output.status.code().unwrap_or(-1);
                if output.status.success() {
                    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    ProbeOutcome {
                        success: true,
                        elapsed_ms: elapsed,
                        status_code: Some(code),
                        message: if stdout.is_empty() { "OK".to_string() } else { stdout },
                        details: Some(json!({ "script": rendered })),
                    }
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    ProbeOutcome {
                        success: false,
                        elapsed_ms: elapsed,
                        status_code: Some(code),
                        message: if stderr.is_empty() {
                            format!("exit code: {code}")
                        } else {
                            stderr
                        },
                        details: None,
                    }
                }
            }
            Err(message) => {
                ProbeOutcome::failure(start.elapsed().as_secs_f64() * 1000.0, message)
            }
        }
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
