// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing instance operations
//!
//! start/stop/restart/status/list, serialized per instance by file locks.
//! Every observation goes through a cheap process probe first so decisions
//! are made against corrected state, not whatever the database last said.

use crate::command;
use crate::error::EngineError;
use crate::spawn::{self, DEFAULT_STOP_TIMEOUT};
use crate::SERVER_BINARY_PATTERN;
use herd_adapters::{port, process};
use herd_binaries::BinaryManager;
use herd_config::{
    config_fingerprint, discover_instances, load_instance, InstanceConfig, ProjectDirs,
};
use herd_core::event::kind;
use herd_core::{
    epoch_secs, DesiredState, EventLevel, EventRecord, HealthStatus, InstanceStatus, RuntimeRecord,
};
use herd_storage::{LockGuard, LockManager, StateDb, DEFAULT_ACQUIRE_TIMEOUT};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Pause between stop and start during a restart.
const RESTART_GAP: Duration = Duration::from_millis(500);

/// Composes storage, probes and the binary registry into instance
/// lifecycle operations.
pub struct Supervisor {
    dirs: ProjectDirs,
    db: StateDb,
    locks: LockManager,
    binaries: BinaryManager,
}

impl Supervisor {
    pub fn new(dirs: ProjectDirs, db: StateDb, locks: LockManager, binaries: BinaryManager) -> Self {
        Self {
            dirs,
            db,
            locks,
            binaries,
        }
    }

    pub fn db(&self) -> &StateDb {
        &self.db
    }

    pub fn dirs(&self) -> &ProjectDirs {
        &self.dirs
    }

    pub fn binaries(&self) -> &BinaryManager {
        &self.binaries
    }

    /// Acquire the per-instance lock off the async runtime (acquisition
    /// sleeps between retries).
    async fn lock(&self, name: &str, operation: &str) -> Result<LockGuard, EngineError> {
        let locks = self.locks.clone();
        let name = name.to_string();
        let operation = operation.to_string();
        tokio::task::spawn_blocking(move || {
            locks.acquire(&name, &operation, DEFAULT_ACQUIRE_TIMEOUT)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("lock task failed: {e}")))?
        .map_err(EngineError::from)
    }

    /// Correct a record against the live process table: a running record
    /// whose process is gone becomes stopped.
    async fn corrected(&self, mut record: RuntimeRecord) -> Result<RuntimeRecord, EngineError> {
        if !matches!(
            record.status,
            InstanceStatus::Running | InstanceStatus::Starting
        ) {
            return Ok(record);
        }

        let alive = record.pid.is_some_and(|pid| {
            let report = process::classify(pid, SERVER_BINARY_PATTERN, None, Duration::MAX);
            report.check == process::ProcessCheck::Valid
        });

        if !alive {
            record.mark_stopped("process died unexpectedly");
            self.db.upsert_runtime(&record).await?;
        }
        Ok(record)
    }

    /// Start an instance.
    pub async fn start(&self, name: &str) -> Result<RuntimeRecord, EngineError> {
        let config = load_instance(&self.dirs, name)?;
        let _guard = self.lock(name, "start").await?;

        let mut record = match self.db.load_runtime(name).await? {
            Some(record) => self.corrected(record).await?,
            None => RuntimeRecord::stopped(name),
        };

        if record.status == InstanceStatus::Running {
            if let Some(pid) = record.pid {
                return Err(EngineError::AlreadyRunning {
                    name: name.to_string(),
                    pid,
                });
            }
        }

        let all_records = self.db.load_all_runtime().await?;
        if let Err(conflict) =
            port::validate_for_instance(&config.server.host, config.server.port, name, &all_records)
        {
            self.db
                .log_event(
                    &EventRecord::new(kind::PORT_COLLISION, conflict.reason.clone())
                        .instance(name)
                        .level(EventLevel::Warning)
                        .meta(json!({
                            "port": conflict.port,
                            "owner_pid": conflict.owner_pid,
                            "owner_instance": conflict.owner_instance,
                            "suggested": conflict.suggested,
                        })),
                )
                .await?;
            return Err(EngineError::PortConflict { conflict });
        }

        let entry = self
            .binaries
            .resolve(config.binary.as_ref())
            .ok_or_else(|| EngineError::BinaryNotInstalled {
                name: name.to_string(),
            })?;
        let server_path = self
            .binaries
            .registry()
            .server_path(entry)
            .ok_or_else(|| EngineError::BinaryNotInstalled {
                name: name.to_string(),
            })?;
        let binary_version = entry.version.clone();

        if !config.model.path.exists() {
            return Err(EngineError::ModelMissing {
                path: config.model.path.clone(),
            });
        }

        let cmd = command::build_command(&config, &server_path);
        let env = config.env_vars();
        let log_dir = self.dirs.instance_logs_dir(name);

        record.status = InstanceStatus::Starting;
        record.health = HealthStatus::Unknown;
        record.last_error.clear();
        record.config_hash = config_fingerprint(&config)?;
        record.binary_version = binary_version;
        self.db.upsert_runtime(&record).await?;

        match spawn::start_detached(
            name,
            &cmd,
            &env,
            self.dirs.root(),
            &log_dir,
            config.logs.rotation,
        )
        .await
        {
            Ok(outcome) => {
                record.pid = Some(outcome.pid);
                record.port = Some(config.server.port);
                record.cmdline = outcome.cmdline;
                record.status = InstanceStatus::Running;
                record.health = HealthStatus::Loading;
                record.started_at = Some(epoch_secs());
                record.last_seen_at = Some(epoch_secs());
                self.db.upsert_runtime(&record).await?;
                self.db.set_desired_state(name, DesiredState::Running).await?;
                self.db
                    .log_event(
                        &EventRecord::new(
                            kind::STARTED,
                            format!(
                                "instance started (pid {}, port {})",
                                outcome.pid, config.server.port
                            ),
                        )
                        .instance(name)
                        .meta(json!({ "pid": outcome.pid, "port": config.server.port })),
                    )
                    .await?;
                info!(instance = name, pid = outcome.pid, "started");
                Ok(record)
            }
            Err(e) => {
                let exit_code = match &e {
                    EngineError::SpawnFailed { exit_code, .. } => *exit_code,
                    _ => None,
                };
                record.mark_error(e.to_string());
                self.db.upsert_runtime(&record).await?;
                self.db
                    .log_event(
                        &EventRecord::new(kind::START_FAILED, e.to_string())
                            .instance(name)
                            .level(EventLevel::Error)
                            .meta(json!({ "exit_code": exit_code })),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    /// Stop an instance. No-op when already stopped.
    pub async fn stop(
        &self,
        name: &str,
        force: bool,
        timeout: Duration,
    ) -> Result<RuntimeRecord, EngineError> {
        let _guard = self.lock(name, "stop").await?;
        self.db.set_desired_state(name, DesiredState::Stopped).await?;

        let Some(record) = self.db.load_runtime(name).await? else {
            return Ok(RuntimeRecord::stopped(name));
        };
        let mut record = self.corrected(record).await?;

        if record.status == InstanceStatus::Stopped {
            return Ok(record);
        }

        let Some(pid) = record.pid else {
            record.mark_stopped("");
            self.db.upsert_runtime(&record).await?;
            return Ok(record);
        };

        record.status = InstanceStatus::Stopping;
        self.db.upsert_runtime(&record).await?;

        let log_dir = self.dirs.instance_logs_dir(name);
        spawn::stop_detached(name, pid, force, timeout, &log_dir).await;

        record.mark_stopped("");
        self.db.upsert_runtime(&record).await?;
        self.db
            .log_event(
                &EventRecord::new(kind::STOPPED, format!("instance stopped (pid {pid})"))
                    .instance(name)
                    .meta(json!({ "pid": pid, "force": force })),
            )
            .await?;
        info!(instance = name, pid, force, "stopped");
        Ok(record)
    }

    /// Restart: stop, short gap, start; bumps the restart counter.
    pub async fn restart(&self, name: &str, force: bool) -> Result<RuntimeRecord, EngineError> {
        let previous_count = self
            .db
            .load_runtime(name)
            .await?
            .map(|r| r.restart_count)
            .unwrap_or(0);

        if let Err(e) = self.stop(name, force, DEFAULT_STOP_TIMEOUT).await {
            warn!(instance = name, error = %e, "stop before restart failed");
        }
        tokio::time::sleep(RESTART_GAP).await;

        let mut record = self.start(name).await?;
        record.restart_count = previous_count + 1;
        self.db.upsert_runtime(&record).await?;
        Ok(record)
    }

    /// Probe-corrected record for one configured instance.
    pub async fn status(&self, name: &str) -> Result<RuntimeRecord, EngineError> {
        // Configuration must exist even if nothing ever ran.
        let _ = load_instance(&self.dirs, name)?;
        match self.db.load_runtime(name).await? {
            Some(record) => self.corrected(record).await,
            None => Ok(RuntimeRecord::stopped(name)),
        }
    }

    /// Probe-corrected records for every configured instance plus any
    /// leftover records whose configuration is gone, ordered by name.
    pub async fn list(&self) -> Result<Vec<RuntimeRecord>, EngineError> {
        let mut by_name: BTreeMap<String, RuntimeRecord> = BTreeMap::new();
        for record in self.db.load_all_runtime().await? {
            by_name.insert(record.name.clone(), record);
        }
        for name in discover_instances(&self.dirs)? {
            by_name
                .entry(name.clone())
                .or_insert_with(|| RuntimeRecord::stopped(name));
        }

        let mut result = Vec::with_capacity(by_name.len());
        for (_, record) in by_name {
            result.push(self.corrected(record).await?);
        }
        Ok(result)
    }

    /// Drop an instance's runtime record entirely.
    pub async fn forget(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.db.delete_runtime(name).await?)
    }

    /// Load a configured instance (for callers needing healthcheck or
    /// restart policy details).
    pub fn load_config(&self, name: &str) -> Result<InstanceConfig, EngineError> {
        Ok(load_instance(&self.dirs, name)?)
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
