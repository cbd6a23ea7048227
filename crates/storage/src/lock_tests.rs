// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn manager() -> (tempfile::TempDir, LockManager) {
    let tmp = tempfile::tempdir().unwrap();
    let manager = LockManager::new(tmp.path());
    (tmp, manager)
}

#[test]
fn acquire_writes_pid_stamped_file() {
    let (tmp, manager) = manager();
    let guard = manager
        .acquire("gpt", "start", Duration::from_secs(1))
        .unwrap();

    let content = std::fs::read_to_string(tmp.path().join("gpt.lock")).unwrap();
    let info = LockInfo::parse(&content).unwrap();
    assert_eq!(info.pid, std::process::id());
    assert_eq!(info.operation, "start");
    assert!(info.created > 0.0);

    drop(guard);
    assert!(!tmp.path().join("gpt.lock").exists());
}

#[test]
fn reacquire_within_same_manager_succeeds() {
    let (_tmp, manager) = manager();
    let _a = manager
        .acquire("gpt", "start", Duration::from_secs(1))
        .unwrap();
    // Re-entrant within the same manager
    let _b = manager
        .acquire("gpt", "start", Duration::from_secs(1))
        .unwrap();
}

#[test]
fn foreign_live_lock_times_out() {
    let (tmp, manager) = manager();
    // Simulate another live process (our own pid, but a fresh manager that
    // doesn't know it holds anything).
    let info = LockInfo {
        pid: std::process::id(),
        created: herd_core::epoch_secs(),
        operation: "stop".to_string(),
    };
    std::fs::write(tmp.path().join("gpt.lock"), info.render()).unwrap();

    let other = LockManager::new(tmp.path());
    let err = other
        .acquire_with(
            "gpt",
            "start",
            Duration::from_millis(200),
            Duration::from_millis(50),
        )
        .unwrap_err();

    match &err {
        StorageError::LockTimeout {
            name,
            owner_pid,
            operation,
            ..
        } => {
            assert_eq!(name, "gpt");
            assert_eq!(*owner_pid, Some(std::process::id()));
            assert_eq!(operation, "stop");
        }
        other => panic!("expected LockTimeout, got {other:?}"),
    }
    assert!(err.is_transient());
}

#[test]
fn dead_owner_lock_is_acquired_without_waiting() {
    let (tmp, manager) = manager();
    // Pid 0 is never a valid owner; i32::MAX is almost certainly dead too.
    let info = LockInfo {
        pid: i32::MAX as u32 - 1,
        created: herd_core::epoch_secs(),
        operation: "start".to_string(),
    };
    std::fs::write(tmp.path().join("gpt.lock"), info.render()).unwrap();

    let start = std::time::Instant::now();
    let _guard = manager
        .acquire("gpt", "start", Duration::from_secs(5))
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn old_lock_is_stale_even_with_live_owner() {
    let (tmp, _) = manager();
    let manager = LockManager::new(tmp.path()).with_stale_after(Duration::from_secs(1));
    let info = LockInfo {
        pid: std::process::id(),
        created: herd_core::epoch_secs() - 10.0,
        operation: "start".to_string(),
    };
    std::fs::write(tmp.path().join("gpt.lock"), info.render()).unwrap();

    let other = LockManager::new(tmp.path()).with_stale_after(Duration::from_secs(1));
    let _guard = other
        .acquire("gpt", "start", Duration::from_secs(2))
        .unwrap();
    drop(manager);
}

#[test]
fn unparseable_lock_file_counts_as_stale() {
    let (tmp, manager) = manager();
    std::fs::write(tmp.path().join("gpt.lock"), "garbage").unwrap();
    let _guard = manager
        .acquire("gpt", "start", Duration::from_secs(1))
        .unwrap();
}

#[test]
fn is_locked_reflects_liveness() {
    let (_tmp, manager) = manager();
    assert!(!manager.is_locked("gpt"));
    let guard = manager
        .acquire("gpt", "start", Duration::from_secs(1))
        .unwrap();
    assert!(manager.is_locked("gpt"));
    guard.release().unwrap();
    assert!(!manager.is_locked("gpt"));
}

#[test]
fn cleanup_removes_stale_locks_only() {
    let (tmp, manager) = manager();
    let dead = LockInfo {
        pid: i32::MAX as u32 - 1,
        created: herd_core::epoch_secs(),
        operation: "start".to_string(),
    };
    std::fs::write(tmp.path().join("dead.lock"), dead.render()).unwrap();
    let _live = manager
        .acquire("live", "start", Duration::from_secs(1))
        .unwrap();

    assert_eq!(manager.cleanup_stale(), 1);
    assert!(tmp.path().join("live.lock").exists());
    assert!(!tmp.path().join("dead.lock").exists());
}

#[test]
fn lock_names_are_sanitized_for_the_filesystem() {
    let (tmp, manager) = manager();
    let _guard = manager
        .acquire("a/b c", "start", Duration::from_secs(1))
        .unwrap();
    assert!(tmp.path().join("a_b_c.lock").exists());
}

#[test]
fn lock_set_acquires_sorted_and_releases_all() {
    let (tmp, manager) = manager();
    {
        let set = LockSet::acquire(
            &manager,
            &["zeta", "alpha", "mid"],
            "restart",
            Duration::from_secs(1),
        )
        .unwrap();
        // Stored in reverse acquisition order: zeta, mid, alpha
        assert_eq!(set.names(), vec!["zeta", "mid", "alpha"]);
        assert!(tmp.path().join("alpha.lock").exists());
        assert!(tmp.path().join("zeta.lock").exists());
    }
    assert!(!tmp.path().join("alpha.lock").exists());
    assert!(!tmp.path().join("zeta.lock").exists());
}
