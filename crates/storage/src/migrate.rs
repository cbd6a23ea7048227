// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot import of legacy per-instance state files
//!
//! Earlier versions kept one `state.json` next to each instance's
//! `config.json`. The database is now the single store: legacy files are
//! imported once, renamed to `state.json.migrated`, and when both sides
//! have a record the database wins and the conflict is logged as a warning
//! event so nothing is resolved silently.

use crate::db::StateDb;
use crate::error::StorageError;
use herd_core::event::kind;
use herd_core::{EventLevel, EventRecord, RuntimeRecord};
use std::path::Path;
use tracing::{info, warn};

/// Import legacy `instances/<name>/state.json` files into the database.
///
/// Returns the number of records imported (conflicting records count as
/// skipped, not imported).
pub async fn migrate_legacy_state(
    db: &StateDb,
    instances_dir: &Path,
) -> Result<usize, StorageError> {
    if !instances_dir.exists() {
        return Ok(0);
    }

    let mut imported = 0;
    for entry in std::fs::read_dir(instances_dir)? {
        let entry = entry?;
        let legacy_path = entry.path().join("state.json");
        if !legacy_path.is_file() {
            continue;
        }

        let text = std::fs::read_to_string(&legacy_path)?;
        let record: RuntimeRecord = match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %legacy_path.display(), error = %e, "skipping unreadable legacy state file");
                continue;
            }
        };

        match db.load_runtime(&record.name).await? {
            Some(existing) => {
                if existing.status != record.status {
                    warn!(
                        instance = %record.name,
                        db_status = %existing.status,
                        legacy_status = %record.status,
                        "legacy state conflicts with database; database wins"
                    );
                    db.log_event(
                        &EventRecord::new(
                            kind::STATE_MIGRATED,
                            format!(
                                "legacy state file said '{}' but database says '{}'; kept database",
                                record.status, existing.status
                            ),
                        )
                        .instance(&record.name)
                        .level(EventLevel::Warning),
                    )
                    .await?;
                }
            }
            None => {
                db.upsert_runtime(&record).await?;
                db.log_event(
                    &EventRecord::new(kind::STATE_MIGRATED, "imported legacy state file")
                        .instance(&record.name),
                )
                .await?;
                info!(instance = %record.name, "imported legacy state file");
                imported += 1;
            }
        }

        let migrated_path = legacy_path.with_extension("json.migrated");
        if let Err(e) = std::fs::rename(&legacy_path, &migrated_path) {
            warn!(path = %legacy_path.display(), error = %e, "failed to rename migrated state file");
        }
    }

    Ok(imported)
}

#[cfg(test)]
#[path = "migrate_tests.rs"]
mod tests;
