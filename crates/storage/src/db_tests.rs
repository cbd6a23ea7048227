// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use herd_core::event::kind;
use serde_json::json;

async fn open_db() -> (tempfile::TempDir, StateDb) {
    let tmp = tempfile::tempdir().unwrap();
    let db = StateDb::open(&tmp.path().join("state.sqlite")).await.unwrap();
    (tmp, db)
}

fn running_record(name: &str, pid: u32, port: u16) -> RuntimeRecord {
    let mut rec = RuntimeRecord::stopped(name);
    rec.pid = Some(pid);
    rec.port = Some(port);
    rec.cmdline = format!("llama-server model.gguf --port {port}");
    rec.status = InstanceStatus::Running;
    rec.health = HealthStatus::Loading;
    rec.started_at = Some(herd_core::epoch_secs());
    rec
}

#[tokio::test]
async fn open_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.sqlite");
    let db1 = StateDb::open(&path).await.unwrap();
    db1.close().await;
    // Second open re-runs schema init against existing tables
    let _db2 = StateDb::open(&path).await.unwrap();
}

#[tokio::test]
async fn upsert_and_load_round_trips() {
    let (_tmp, db) = open_db().await;
    let rec = running_record("gpt", 4242, 8801);
    db.upsert_runtime(&rec).await.unwrap();

    let loaded = db.load_runtime("gpt").await.unwrap().unwrap();
    assert_eq!(loaded.pid, Some(4242));
    assert_eq!(loaded.port, Some(8801));
    assert_eq!(loaded.status, InstanceStatus::Running);
    assert_eq!(loaded.health, HealthStatus::Loading);
    assert!(loaded.updated_at > 0.0);
}

#[tokio::test]
async fn upsert_overwrites_existing_row() {
    let (_tmp, db) = open_db().await;
    db.upsert_runtime(&running_record("gpt", 1, 8801)).await.unwrap();

    let mut rec = running_record("gpt", 1, 8801);
    rec.mark_stopped("process died unexpectedly");
    db.upsert_runtime(&rec).await.unwrap();

    let loaded = db.load_runtime("gpt").await.unwrap().unwrap();
    assert_eq!(loaded.status, InstanceStatus::Stopped);
    assert!(loaded.pid.is_none());
    assert_eq!(loaded.last_error, "process died unexpectedly");
}

#[tokio::test]
async fn load_all_is_ordered_by_name() {
    let (_tmp, db) = open_db().await;
    db.upsert_runtime(&running_record("zeta", 1, 8801)).await.unwrap();
    db.upsert_runtime(&running_record("alpha", 2, 8802)).await.unwrap();

    let all = db.load_all_runtime().await.unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn delete_runtime_reports_existence() {
    let (_tmp, db) = open_db().await;
    db.upsert_runtime(&running_record("gpt", 1, 8801)).await.unwrap();
    assert!(db.delete_runtime("gpt").await.unwrap());
    assert!(!db.delete_runtime("gpt").await.unwrap());
    assert!(db.load_runtime("gpt").await.unwrap().is_none());
}

#[tokio::test]
async fn record_health_touches_row() {
    let (_tmp, db) = open_db().await;
    db.upsert_runtime(&running_record("gpt", 1, 8801)).await.unwrap();

    db.record_health("gpt", HealthStatus::Healthy, "").await.unwrap();

    let loaded = db.load_runtime("gpt").await.unwrap().unwrap();
    assert_eq!(loaded.health, HealthStatus::Healthy);
    assert!(loaded.last_health_check.is_some());
}

#[tokio::test]
async fn events_are_appended_with_growing_ids() {
    let (_tmp, db) = open_db().await;
    let first = db
        .log_event(&EventRecord::new(kind::STARTED, "up").instance("gpt"))
        .await
        .unwrap();
    let second = db
        .log_event(&EventRecord::new(kind::STOPPED, "down").instance("gpt"))
        .await
        .unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn recent_events_filters_by_instance_and_level() {
    let (_tmp, db) = open_db().await;
    db.log_event(&EventRecord::new(kind::STARTED, "a up").instance("a"))
        .await
        .unwrap();
    db.log_event(
        &EventRecord::new(kind::PORT_COLLISION, "b port")
            .instance("b")
            .level(EventLevel::Warning),
    )
    .await
    .unwrap();
    db.log_event(
        &EventRecord::new(kind::PID_MISMATCH, "b pid")
            .instance("b")
            .level(EventLevel::Error),
    )
    .await
    .unwrap();

    let all = db.recent_events(None, None, 10).await.unwrap();
    assert_eq!(all.len(), 3);
    // Newest first
    assert_eq!(all[0].event_type, kind::PID_MISMATCH);

    let b_only = db.recent_events(Some("b"), None, 10).await.unwrap();
    assert_eq!(b_only.len(), 2);

    let b_errors = db
        .recent_events(Some("b"), Some(EventLevel::Error), 10)
        .await
        .unwrap();
    assert_eq!(b_errors.len(), 1);
    assert_eq!(b_errors[0].message, "b pid");
}

#[tokio::test]
async fn event_meta_round_trips() {
    let (_tmp, db) = open_db().await;
    db.log_event(
        &EventRecord::new(kind::PORT_COLLISION, "taken")
            .meta(json!({"port": 8801, "owner_pid": 77})),
    )
    .await
    .unwrap();

    let events = db.recent_events(None, None, 1).await.unwrap();
    let meta = events[0].meta.as_ref().unwrap();
    assert_eq!(meta["port"], 8801);
    assert_eq!(meta["owner_pid"], 77);
}

#[tokio::test]
async fn purge_drops_only_old_events() {
    let (_tmp, db) = open_db().await;
    let mut old = EventRecord::new(kind::STARTED, "ancient");
    old.ts = herd_core::epoch_secs() - 100_000.0;
    db.log_event(&old).await.unwrap();
    db.log_event(&EventRecord::new(kind::STARTED, "fresh")).await.unwrap();

    let removed = db
        .purge_events_before(herd_core::epoch_secs() - 1000.0)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let remaining = db.recent_events(None, None, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].message, "fresh");
}

#[tokio::test]
async fn desired_state_defaults_to_stopped_and_persists() {
    let (_tmp, db) = open_db().await;
    assert_eq!(db.desired_state("gpt").await.unwrap(), DesiredState::Stopped);

    db.set_desired_state("gpt", DesiredState::Running).await.unwrap();
    assert_eq!(db.desired_state("gpt").await.unwrap(), DesiredState::Running);

    db.set_desired_state("gpt", DesiredState::Stopped).await.unwrap();
    assert_eq!(db.desired_state("gpt").await.unwrap(), DesiredState::Stopped);
}
