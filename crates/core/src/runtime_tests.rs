// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn stopped_record_has_no_process_fields() {
    let rec = RuntimeRecord::stopped("gpt");
    assert_eq!(rec.name, "gpt");
    assert_eq!(rec.status, InstanceStatus::Stopped);
    assert_eq!(rec.health, HealthStatus::Unknown);
    assert!(rec.pid.is_none());
    assert!(rec.uptime().is_none());
    assert_eq!(rec.uptime_str(), "-");
}

#[test]
fn uptime_counts_from_start() {
    let mut rec = RuntimeRecord::stopped("gpt");
    rec.started_at = Some(epoch_secs() - 90.0);
    let uptime = rec.uptime().unwrap();
    assert!((89.0..95.0).contains(&uptime), "got {uptime}");
    assert!(rec.uptime_str().starts_with("1m"));
}

#[test]
fn mark_stopped_clears_pid_and_records_error() {
    let mut rec = RuntimeRecord::stopped("gpt");
    rec.pid = Some(4242);
    rec.status = InstanceStatus::Running;
    rec.health = HealthStatus::Healthy;

    rec.mark_stopped("process died unexpectedly");

    assert_eq!(rec.status, InstanceStatus::Stopped);
    assert_eq!(rec.health, HealthStatus::Unknown);
    assert!(rec.pid.is_none());
    assert_eq!(rec.last_error, "process died unexpectedly");
}

#[test]
fn mark_error_keeps_pid() {
    let mut rec = RuntimeRecord::stopped("gpt");
    rec.pid = Some(4242);
    rec.status = InstanceStatus::Running;

    rec.mark_error("pid reused by different process");

    assert_eq!(rec.status, InstanceStatus::Error);
    assert_eq!(rec.health, HealthStatus::Error);
    assert_eq!(rec.pid, Some(4242));
}

#[test]
fn serde_round_trip() {
    let mut rec = RuntimeRecord::stopped("gpt");
    rec.pid = Some(100);
    rec.port = Some(8801);
    rec.cmdline = "llama-server model.gguf --port 8801".to_string();
    rec.status = InstanceStatus::Running;

    let json = serde_json::to_string(&rec).unwrap();
    let back: RuntimeRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back.name, rec.name);
    assert_eq!(back.pid, rec.pid);
    assert_eq!(back.port, rec.port);
    assert_eq!(back.status, rec.status);
}
