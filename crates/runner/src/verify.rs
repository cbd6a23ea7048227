// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-run verification
//!
//! Runs a lint → tests → build sequence against the workspace, each step
//! skippable and auto-detected from project files when no command is
//! configured. The optional auto-fix loop hands failure descriptions to a
//! caller-supplied runner (typically another containerized tool run) and
//! re-verifies, up to a bounded number of rounds.

use async_trait::async_trait;
use herd_adapters::subprocess::run_shell_with_timeout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
    /// Process-level problem: spawn failure or timeout.
    Error,
}

/// Report for one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub output: String,
    pub duration_secs: f64,
}

/// Report for one verification pass (plus fix-loop bookkeeping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub success: bool,
    pub checks: Vec<CheckReport>,
    #[serde(default)]
    pub fix_attempts: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl VerifyReport {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn failing_checks(&self) -> impl Iterator<Item = &CheckReport> {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Failed | CheckStatus::Error))
    }
}

/// One step's configuration.
#[derive(Debug, Clone, Default)]
pub struct StepConfig {
    pub enabled: bool,
    /// `None` means auto-detect from project files.
    pub command: Option<String>,
}

impl StepConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            command: None,
        }
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            enabled: true,
            command: Some(command.into()),
        }
    }
}

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub lint: StepConfig,
    pub tests: StepConfig,
    pub build: StepConfig,
    pub step_timeout: Duration,
    /// Auto-fix rounds allowed after the initial pass.
    pub max_iterations: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            lint: StepConfig::enabled(),
            tests: StepConfig::enabled(),
            build: StepConfig::default(),
            step_timeout: Duration::from_secs(120),
            max_iterations: 2,
        }
    }
}

/// Auto-detect a step command from project files.
pub fn detect_command(workspace: &Path, step: &str) -> Option<String> {
    let has = |file: &str| workspace.join(file).exists();

    match step {
        "lint" => {
            if has("Cargo.toml") {
                Some("cargo clippy --quiet".to_string())
            } else if has("pyproject.toml") {
                Some("ruff check .".to_string())
            } else if has("package.json") {
                Some("npm run lint --if-present".to_string())
            } else {
                None
            }
        }
        "tests" => {
            if has("Cargo.toml") {
                Some("cargo test --quiet".to_string())
            } else if has("pyproject.toml") {
                Some("python -m pytest -q".to_string())
            } else if has("package.json") {
                Some("npm test".to_string())
            } else {
                None
            }
        }
        "build" => {
            if has("Cargo.toml") {
                Some("cargo build --quiet".to_string())
            } else if has("pyproject.toml") {
                Some("python -m build".to_string())
            } else if has("package.json") {
                Some("npm run build --if-present".to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Callback that attempts to repair the workspace given a failure
/// description; typically another containerized tool run.
#[async_trait]
pub trait FixRunner: Send + Sync {
    async fn fix(&self, prompt: &str) -> Result<(), String>;
}

/// Runs the configured check sequence against one workspace.
pub struct Verifier {
    workspace: PathBuf,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(workspace: impl Into<PathBuf>, config: VerifyConfig) -> Self {
        Self {
            workspace: workspace.into(),
            config,
        }
    }

    async fn run_step(&self, name: &str, step: &StepConfig) -> CheckReport {
        if !step.enabled {
            return CheckReport {
                name: name.to_string(),
                status: CheckStatus::Skipped,
                command: None,
                output: String::new(),
                duration_secs: 0.0,
            };
        }

        let command = step
            .command
            .clone()
            .or_else(|| detect_command(&self.workspace, name));
        let Some(command) = command else {
            return CheckReport {
                name: name.to_string(),
                status: CheckStatus::Skipped,
                command: None,
                output: "no command configured or detected".to_string(),
                duration_secs: 0.0,
            };
        };

        let start = Instant::now();
        let result = run_shell_with_timeout(
            &command,
            Some(&self.workspace),
            self.config.step_timeout,
            name,
        )
        .await;
        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let status = if output.status.success() {
                    CheckStatus::Passed
                } else {
                    CheckStatus::Failed
                };
                CheckReport {
                    name: name.to_string(),
                    status,
                    command: Some(command),
                    output: combined,
                    duration_secs: duration,
                }
            }
            Err(message) => CheckReport {
                name: name.to_string(),
                status: CheckStatus::Error,
                command: Some(command),
                output: message,
                duration_secs: duration,
            },
        }
    }

    /// One verification pass. Overall success iff every non-skipped check
    /// passed.
    pub async fn run(&self) -> VerifyReport {
        let mut checks = Vec::with_capacity(3);
        checks.push(self.run_step("lint", &self.config.lint).await);
        checks.push(self.run_step("tests", &self.config.tests).await);
        checks.push(self.run_step("build", &self.config.build).await);

        let success = checks
            .iter()
            .all(|c| matches!(c.status, CheckStatus::Passed | CheckStatus::Skipped));
        let errors = checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Failed | CheckStatus::Error))
            .map(|c| format!("{} failed", c.name))
            .collect();

        VerifyReport {
            success,
            checks,
            fix_attempts: 0,
            errors,
        }
    }

    /// Verify, and while failing, hand a failure description to `fixer`
    /// and re-verify, up to `max_iterations` rounds.
    pub async fn run_with_auto_fix(&self, fixer: &dyn FixRunner) -> VerifyReport {
        let mut report = self.run().await;
        let mut attempts = 0;

        while !report.success && attempts < self.config.max_iterations {
            let prompt = fix_prompt(&report);
            info!(attempt = attempts + 1, "attempting auto-fix");
            if let Err(e) = fixer.fix(&prompt).await {
                warn!(error = %e, "fix attempt failed to run");
            }
            attempts += 1;
            report = self.run().await;
        }

        report.fix_attempts = attempts;
        report
    }
}

/// Failure description handed to the fix runner.
fn fix_prompt(report: &VerifyReport) -> String {
    let mut parts = vec!["Fix the following verification failures:".to_string()];
    for check in report.failing_checks() {
        let mut output = check.output.clone();
        output.truncate(2000);
        parts.push(format!("## {} output\n```\n{}\n```", check.name, output));
    }
    parts.push("Make all checks pass without changing their configuration.".to_string());
    parts.join("\n\n")
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
