// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn acquire_writes_our_pid_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daemon.pid");

    {
        let guard = PidFileGuard::acquire(&path).unwrap();
        assert_eq!(guard.path(), path);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim().parse::<u32>().unwrap(), std::process::id());
        assert_eq!(running_daemon_pid(&path), Some(std::process::id()));
    }
    assert!(!path.exists());
}

#[test]
fn live_owner_refuses_a_second_acquire() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daemon.pid");
    std::fs::write(&path, format!("{}\n", std::process::id())).unwrap();

    let err = PidFileGuard::acquire(&path).unwrap_err();
    assert!(matches!(err, PidFileError::AlreadyRunning { .. }));
}

#[test]
fn stale_pid_file_is_replaced() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daemon.pid");
    std::fs::write(&path, format!("{}\n", i32::MAX as u32 - 1)).unwrap();

    let _guard = PidFileGuard::acquire(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim().parse::<u32>().unwrap(), std::process::id());
}

#[test]
fn garbage_pid_file_is_replaced() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daemon.pid");
    std::fs::write(&path, "not a pid").unwrap();
    assert!(running_daemon_pid(&path).is_none());
    let _guard = PidFileGuard::acquire(&path).unwrap();
}
