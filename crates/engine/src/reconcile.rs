// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desired-vs-actual reconciliation
//!
//! Walks every non-stopped runtime record, classifies its pid against the
//! process table, and corrects the record: missing processes become
//! `stopped`, pid reuse and zombies become `error`, stale matches only
//! warn. Restarting is never this loop's job; the health monitor owns
//! restarts. Nothing here throws past storage failures: classifications
//! become record transitions and events.

use crate::SERVER_BINARY_PATTERN;
use herd_adapters::process::{self, OrphanProcess, ProcessCheck};
use herd_core::event::kind;
use herd_core::{epoch_secs, EventLevel, EventRecord, InstanceStatus};
use herd_storage::{LockManager, StateDb, StorageError};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub interval: Duration,
    pub stale_after: Duration,
    pub detect_orphans: bool,
    /// Substring identifying managed server processes.
    pub binary_pattern: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
            detect_orphans: true,
            binary_pattern: SERVER_BINARY_PATTERN.to_string(),
        }
    }
}

/// What one pass did.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub marked_stopped: usize,
    pub marked_error: usize,
    pub skipped_locked: usize,
    pub orphans: Vec<OrphanProcess>,
}

impl ReconcileSummary {
    pub fn actions_taken(&self) -> usize {
        self.marked_stopped + self.marked_error + self.orphans.len()
    }
}

/// The periodic reconciliation pass.
pub struct Reconciler {
    db: StateDb,
    locks: LockManager,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(db: StateDb, locks: LockManager, settings: ReconcileSettings) -> Self {
        Self {
            db,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Run one reconciliation pass.
    pub async fn run(&self) -> Result<ReconcileSummary, StorageError> {
        let mut summary = ReconcileSummary::default();
        let records = self.db.load_all_runtime().await?;

        let mut known_pids: HashSet<u32> = HashSet::new();
        for record in &records {
            if let Some(pid) = record.pid {
                known_pids.insert(pid);
            }
        }

        for mut record in records {
            if record.status == InstanceStatus::Stopped {
                continue;
            }
            // An in-flight start/stop holds the instance lock; re-checking
            // mid-operation would race the operation's own writes.
            if self.locks.is_locked(&record.name) {
                debug!(instance = %record.name, "locked, skipping this tick");
                summary.skipped_locked += 1;
                continue;
            }
            summary.checked += 1;

            let Some(pid) = record.pid else {
                record.mark_stopped("no pid recorded for a non-stopped instance");
                self.db.upsert_runtime(&record).await?;
                self.db
                    .log_event(
                        &EventRecord::new(kind::PROCESS_MISSING, "non-stopped record had no pid")
                            .instance(&record.name)
                            .level(EventLevel::Warning),
                    )
                    .await?;
                summary.marked_stopped += 1;
                continue;
            };

            let last_seen_age = record
                .last_seen_at
                .or(record.started_at)
                .map(|t| Duration::from_secs_f64((epoch_secs() - t).max(0.0)));

            let report = process::classify(
                pid,
                &self.settings.binary_pattern,
                last_seen_age,
                self.settings.stale_after,
            );

            match report.check {
                ProcessCheck::Valid => {
                    record.last_seen_at = Some(epoch_secs());
                    self.db.upsert_runtime(&record).await?;
                }
                ProcessCheck::Missing => {
                    record.mark_stopped("process died unexpectedly");
                    self.db.upsert_runtime(&record).await?;
                    self.db
                        .log_event(
                            &EventRecord::new(
                                kind::PROCESS_DIED,
                                format!("process for '{}' is no longer running", record.name),
                            )
                            .instance(&record.name)
                            .level(EventLevel::Warning)
                            .meta(json!({ "pid": pid })),
                        )
                        .await?;
                    summary.marked_stopped += 1;
                }
                ProcessCheck::PidMismatch => {
                    record.mark_error("pid reused by a different process");
                    self.db.upsert_runtime(&record).await?;
                    self.db
                        .log_event(
                            &EventRecord::new(kind::PID_MISMATCH, report.message.clone())
                                .instance(&record.name)
                                .level(EventLevel::Error)
                                .meta(json!({
                                    "pid": pid,
                                    "observed_cmdline": report.cmdline,
                                })),
                        )
                        .await?;
                    summary.marked_error += 1;
                }
                ProcessCheck::Zombie => {
                    record.mark_error("process is a zombie");
                    self.db.upsert_runtime(&record).await?;
                    self.db
                        .log_event(
                            &EventRecord::new(kind::ZOMBIE_PROCESS, report.message.clone())
                                .instance(&record.name)
                                .level(EventLevel::Error)
                                .meta(json!({ "pid": pid })),
                        )
                        .await?;
                    summary.marked_error += 1;
                }
                ProcessCheck::Stale => {
                    warn!(instance = %record.name, message = %report.message, "stale process");
                }
            }
        }

        if self.settings.detect_orphans {
            let orphans = process::find_orphans(&self.settings.binary_pattern, &known_pids);
            for orphan in &orphans {
                let mut cmdline = orphan.cmdline.clone();
                cmdline.truncate(200);
                self.db
                    .log_event(
                        &EventRecord::new(
                            kind::ORPHAN_DETECTED,
                            format!("unmanaged server process found: pid {}", orphan.pid),
                        )
                        .level(EventLevel::Warning)
                        .meta(json!({ "pid": orphan.pid, "cmdline": cmdline })),
                    )
                    .await?;
            }
            summary.orphans = orphans;
        }

        if summary.actions_taken() > 0 {
            self.db
                .log_event(
                    &EventRecord::new(
                        kind::RECONCILIATION,
                        format!(
                            "reconciled {} instances: {} stopped, {} errors, {} orphans",
                            summary.checked,
                            summary.marked_stopped,
                            summary.marked_error,
                            summary.orphans.len()
                        ),
                    )
                    .meta(json!({
                        "checked": summary.checked,
                        "marked_stopped": summary.marked_stopped,
                        "marked_error": summary.marked_error,
                        "orphans": summary.orphans.len(),
                    })),
                )
                .await?;
        }

        Ok(summary)
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
