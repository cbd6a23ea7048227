// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run orchestration
//!
//! create run directory → derive the container envelope from the security
//! mode → inject marker instructions → stream sanitized logs → parse →
//! validate structured output → capture the workspace diff → verify →
//! seal. A tool failure is data in the sealed result, not an error;
//! errors out of here mean the orchestrator itself could not do its job.

use crate::error::RunnerError;
use crate::parser::{heuristic_status, inject_marker_instructions, last_marker, parse_log, summarize};
use crate::patch;
use crate::rundir::{RunDirectory, RunRequest, RunResult, RunStatus};
use crate::sanitize::sanitize_text;
use crate::schema::SchemaValidator;
use crate::security::{envelope, validate_mode};
use crate::verify::{Verifier, VerifyConfig};
use chrono::Utc;
use herd_adapters::{ContainerEngine, ContainerError, ContainerSpec, Mount};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Deterministic container name for a run, used for cancellation.
pub fn container_name(provider: &str, run_id: Uuid) -> String {
    format!("{provider}-run-{run_id}")
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub runs_root: PathBuf,
    /// Image the tool runs in.
    pub image: String,
    pub schemas_dir: Option<PathBuf>,
}

/// Composes the container engine, run directories, parsing, validation,
/// patching and verification into one run lifecycle.
pub struct TaskOrchestrator {
    engine: ContainerEngine,
    config: OrchestratorConfig,
    validator: SchemaValidator,
}

impl TaskOrchestrator {
    pub fn new(engine: ContainerEngine, config: OrchestratorConfig) -> Self {
        let validator = SchemaValidator::new(config.schemas_dir.clone());
        Self {
            engine,
            config,
            validator,
        }
    }

    /// Execute a run to completion and seal its directory.
    pub async fn execute(
        &self,
        request: RunRequest,
        confirm_dangerous: bool,
    ) -> Result<RunResult, RunnerError> {
        validate_mode(request.security_mode, confirm_dangerous)?;

        let rundir = RunDirectory::create(&self.config.runs_root, &request)?;
        let env_spec = envelope(request.security_mode);
        let prompt = inject_marker_instructions(&request.task);

        let workdir = match &request.working_dir {
            Some(sub) => format!("/workspace/{}", sub.trim_start_matches('/')),
            None => "/workspace".to_string(),
        };

        let spec = ContainerSpec {
            image: self.config.image.clone(),
            name: container_name(&request.provider, request.run_id),
            command: vec!["exec".to_string(), "--json".to_string(), prompt],
            env: request
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            mounts: vec![Mount {
                source: request.repo_path.clone(),
                target: "/workspace".to_string(),
                read_only: env_spec.workspace_read_only,
            }],
            workdir: Some(workdir),
            network: env_spec.network,
            cap_drop: env_spec.cap_drop,
            read_only_root: env_spec.read_only_root,
            memory_limit: env_spec.memory_limit,
            cpus: env_spec.cpus,
            pids_limit: env_spec.pids_limit,
        };

        info!(run_id = %request.run_id, mode = %request.security_mode, "executing run");
        let started_at = Utc::now();

        // Producer/consumer over a bounded channel: the engine streams
        // chunks, the consumer sanitizes and appends to log.txt. A slow
        // disk backpressures the stream instead of buffering unboundedly.
        let (tx, mut rx) = mpsc::channel::<String>(256);
        let writer = rundir.clone();
        let consumer = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if writer.append_log(&sanitize_text(&chunk)).is_err() {
                    break;
                }
            }
        });

        let engine_outcome = match self.engine.ensure_image(&spec.image).await {
            Ok(()) => {
                self.engine
                    .run(&spec, Duration::from_secs(request.timeout_secs), tx)
                    .await
            }
            Err(e) => {
                // The consumer only finishes once every sender is gone
                drop(tx);
                Err(e)
            }
        };
        let _ = consumer.await;

        let log = rundir.read_log()?;
        let events = parse_log(&log);
        let summary = summarize(&events);

        let raw_events: Vec<Value> = events.iter().map(|e| e.raw.clone()).collect();
        rundir.write_events(&raw_events)?;
        if let Some(response) = &summary.final_response {
            rundir.write_response(response)?;
        }

        let mut error_field: Option<String> = None;
        let mut exit_code = None;
        let mut status = match &engine_outcome {
            Ok(code) => {
                exit_code = Some(*code);
                match last_marker(&log) {
                    Some(marker) => marker.as_status(),
                    None if *code == 0 => heuristic_status(&log).unwrap_or(RunStatus::Success),
                    None => {
                        error_field = Some(format!("tool exited with code {code}"));
                        RunStatus::Error
                    }
                }
            }
            Err(ContainerError::Timeout { timeout, .. }) => {
                error_field = Some(format!(
                    "run exceeded the {}s wall-clock limit",
                    timeout.as_secs()
                ));
                RunStatus::Timeout
            }
            Err(e) => {
                error_field = Some(e.to_string());
                RunStatus::Error
            }
        };

        if status == RunStatus::Error && error_field.is_none() && !summary.errors.is_empty() {
            error_field = Some(summary.errors.join("; "));
        }

        // Structured-output contract: a configured schema lowers success
        // to error on violation (or on a missing response).
        if let Some(schema_name) = &request.output_schema {
            if status.is_terminal_success() {
                match &summary.final_response {
                    Some(response) => {
                        let (ok, violations) = self.validator.validate(response, schema_name);
                        if !ok {
                            status = RunStatus::Error;
                            error_field =
                                Some(format!("output validation failed: {}", violations.join("; ")));
                        }
                    }
                    None => {
                        status = RunStatus::Error;
                        error_field = Some("no structured response to validate".to_string());
                    }
                }
            }
        }

        let (diff, mut files_changed) = if request.repo_path.is_dir() {
            let diff = match patch::generate_patch(&request.repo_path, true).await {
                Ok(diff) => diff,
                Err(e) => {
                    warn!(error = %e, "patch generation failed");
                    String::new()
                }
            };
            let files = patch::changed_files(&request.repo_path).await.unwrap_or_default();
            rundir.write_patch(&diff)?;
            (diff, files)
        } else {
            (String::new(), Vec::new())
        };
        if files_changed.is_empty() {
            files_changed = summary.files.keys().cloned().collect();
        }

        let verify = if request.verify && status.is_terminal_success() {
            let report = Verifier::new(&request.repo_path, VerifyConfig::default())
                .run()
                .await;
            Some(report.to_value())
        } else {
            None
        };

        let summary_text = summary
            .final_response
            .as_ref()
            .and_then(|r| r.get("summary"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let finished_at = Utc::now();
        let result = RunResult {
            run_id: request.run_id,
            provider: request.provider.clone(),
            status,
            exit_code,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            files_changed,
            diff,
            summary: summary_text,
            verify,
            error: error_field,
            started_at,
            finished_at,
        };

        rundir.seal(&result)?;
        info!(run_id = %request.run_id, status = %result.status, "run sealed");
        Ok(result)
    }

    /// Cancel a run: stop its container by deterministic name and write
    /// the out-of-band status marker.
    pub async fn cancel(&self, provider: &str, run_id: Uuid) -> Result<(), RunnerError> {
        self.engine
            .stop(&container_name(provider, run_id), Duration::from_secs(5))
            .await;
        let rundir = RunDirectory::open(&self.config.runs_root, run_id)?;
        rundir.write_status_marker(RunStatus::Cancelled)?;
        info!(run_id = %run_id, "run cancelled");
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
