// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed runtime state and event log
//!
//! One database file in WAL mode. Writers are serialized by SQLite; readers
//! run concurrently with short transactions. The schema is initialized
//! idempotently on open.

use crate::error::StorageError;
use herd_core::{DesiredState, EventLevel, EventRecord, HealthStatus, InstanceStatus, RuntimeRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

/// Default event retention window in days.
pub const DEFAULT_EVENT_RETENTION_DAYS: u32 = 30;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS instances (
    name TEXT PRIMARY KEY,
    pid INTEGER,
    port INTEGER,
    cmdline TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'stopped',
    health TEXT NOT NULL DEFAULT 'unknown',
    started_at REAL,
    last_seen_at REAL,
    last_health_check REAL,
    restart_count INTEGER NOT NULL DEFAULT 0,
    config_hash TEXT NOT NULL DEFAULT '',
    binary_version TEXT NOT NULL DEFAULT '',
    last_error TEXT NOT NULL DEFAULT '',
    updated_at REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts REAL NOT NULL,
    event_type TEXT NOT NULL,
    level TEXT NOT NULL DEFAULT 'info',
    instance TEXT,
    message TEXT NOT NULL,
    meta TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_instance_ts ON events(instance, ts DESC);

CREATE TABLE IF NOT EXISTS desired (
    name TEXT PRIMARY KEY,
    state TEXT NOT NULL DEFAULT 'stopped'
);
"#;

/// Handle to the state database.
#[derive(Clone)]
pub struct StateDb {
    pool: SqlitePool,
}

impl StateDb {
    /// Open (creating if missing) the database at `path` and initialize the
    /// schema.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    // ── Runtime records ─────────────────────────────────────────────────

    pub async fn upsert_runtime(&self, record: &RuntimeRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO instances (
                name, pid, port, cmdline, status, health, started_at,
                last_seen_at, last_health_check, restart_count, config_hash,
                binary_version, last_error, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                pid = excluded.pid,
                port = excluded.port,
                cmdline = excluded.cmdline,
                status = excluded.status,
                health = excluded.health,
                started_at = excluded.started_at,
                last_seen_at = excluded.last_seen_at,
                last_health_check = excluded.last_health_check,
                restart_count = excluded.restart_count,
                config_hash = excluded.config_hash,
                binary_version = excluded.binary_version,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.name)
        .bind(record.pid.map(|p| p as i64))
        .bind(record.port.map(|p| p as i64))
        .bind(&record.cmdline)
        .bind(record.status.as_str())
        .bind(record.health.as_str())
        .bind(record.started_at)
        .bind(record.last_seen_at)
        .bind(record.last_health_check)
        .bind(record.restart_count as i64)
        .bind(&record.config_hash)
        .bind(&record.binary_version)
        .bind(&record.last_error)
        .bind(herd_core::epoch_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_runtime(&self, name: &str) -> Result<Option<RuntimeRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM instances WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| runtime_from_row(&r)).transpose()
    }

    /// All runtime records, ordered by instance name.
    pub async fn load_all_runtime(&self) -> Result<Vec<RuntimeRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM instances ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(runtime_from_row).collect()
    }

    /// Forget an instance's runtime record. Returns whether a row existed.
    pub async fn delete_runtime(&self, name: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM instances WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the result of a health check on the runtime row.
    pub async fn record_health(
        &self,
        name: &str,
        health: HealthStatus,
        message: &str,
    ) -> Result<(), StorageError> {
        let now = herd_core::epoch_secs();
        sqlx::query(
            r#"
            UPDATE instances
            SET health = ?, last_health_check = ?, last_error = ?, updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(health.as_str())
        .bind(now)
        .bind(message)
        .bind(now)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Event log ───────────────────────────────────────────────────────

    /// Append an event; returns the assigned insertion id.
    pub async fn log_event(&self, event: &EventRecord) -> Result<i64, StorageError> {
        let meta = event
            .meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            "INSERT INTO events (ts, event_type, level, instance, message, meta) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.ts)
        .bind(&event.event_type)
        .bind(event.level.as_str())
        .bind(&event.instance)
        .bind(&event.message)
        .bind(meta)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent events, newest first, optionally filtered by instance
    /// and level.
    pub async fn recent_events(
        &self,
        instance: Option<&str>,
        level: Option<EventLevel>,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let mut sql = String::from("SELECT * FROM events");
        let mut clauses = Vec::new();
        if instance.is_some() {
            clauses.push("instance = ?");
        }
        if level.is_some() {
            clauses.push("level = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ts DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(instance) = instance {
            query = query.bind(instance);
        }
        if let Some(level) = level {
            query = query.bind(level.as_str());
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Delete events older than `cutoff` (unix seconds); returns rows removed.
    pub async fn purge_events_before(&self, cutoff: f64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM events WHERE ts < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ── Desired state ───────────────────────────────────────────────────

    pub async fn desired_state(&self, name: &str) -> Result<DesiredState, StorageError> {
        let row = sqlx::query("SELECT state FROM desired WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| DesiredState::parse(r.get::<String, _>("state").as_str()))
            .unwrap_or_default())
    }

    pub async fn set_desired_state(
        &self,
        name: &str,
        state: DesiredState,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO desired (name, state) VALUES (?, ?) \
             ON CONFLICT(name) DO UPDATE SET state = excluded.state",
        )
        .bind(name)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn runtime_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RuntimeRecord, StorageError> {
    Ok(RuntimeRecord {
        name: row.try_get("name")?,
        pid: row.try_get::<Option<i64>, _>("pid")?.map(|p| p as u32),
        port: row.try_get::<Option<i64>, _>("port")?.map(|p| p as u16),
        cmdline: row.try_get("cmdline")?,
        status: InstanceStatus::parse(row.try_get::<String, _>("status")?.as_str()),
        health: HealthStatus::parse(row.try_get::<String, _>("health")?.as_str()),
        started_at: row.try_get("started_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        last_health_check: row.try_get("last_health_check")?,
        restart_count: row.try_get::<i64, _>("restart_count")? as u32,
        config_hash: row.try_get("config_hash")?,
        binary_version: row.try_get("binary_version")?,
        last_error: row.try_get("last_error")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EventRecord, StorageError> {
    let meta: Option<String> = row.try_get("meta")?;
    Ok(EventRecord {
        id: row.try_get("id")?,
        ts: row.try_get("ts")?,
        event_type: row.try_get("event_type")?,
        level: EventLevel::parse(row.try_get::<String, _>("level")?.as_str()),
        instance: row.try_get("instance")?,
        message: row.try_get("message")?,
        meta: meta.as_deref().map(serde_json::from_str).transpose()?,
    })
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
