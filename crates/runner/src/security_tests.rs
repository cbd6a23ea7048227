// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn readonly_locks_everything_down() {
    let env = envelope(SecurityMode::Readonly);
    assert!(env.workspace_read_only);
    assert_eq!(env.network, NetworkMode::None);
    assert_eq!(env.cap_drop, vec!["ALL"]);
    assert!(env.read_only_root);
    assert!(env.memory_limit.is_some());
    assert!(env.pids_limit.is_some());
}

#[test]
fn workspace_write_allows_writes_but_no_network() {
    let env = envelope(SecurityMode::WorkspaceWrite);
    assert!(!env.workspace_read_only);
    assert_eq!(env.network, NetworkMode::None);
    assert_eq!(env.cap_drop, vec!["ALL"]);
    assert!(!env.read_only_root);
    assert!(env.memory_limit.is_some());
}

#[test]
fn full_access_keeps_defaults() {
    let env = envelope(SecurityMode::FullAccess);
    assert!(!env.workspace_read_only);
    assert_eq!(env.network, NetworkMode::Bridge);
    assert!(env.cap_drop.is_empty());
    assert!(!env.read_only_root);
    assert!(env.memory_limit.is_none());
    assert!(env.pids_limit.is_none());
}

#[test]
fn dangerous_mode_needs_confirmation() {
    assert!(validate_mode(SecurityMode::Readonly, false).is_ok());
    assert!(validate_mode(SecurityMode::WorkspaceWrite, false).is_ok());
    assert!(matches!(
        validate_mode(SecurityMode::FullAccess, false),
        Err(RunnerError::SecurityRefused { .. })
    ));
    assert!(validate_mode(SecurityMode::FullAccess, true).is_ok());
}

#[yare::parameterized(
    readonly  = { SecurityMode::Readonly, "readonly" },
    write     = { SecurityMode::WorkspaceWrite, "workspace_write" },
    full      = { SecurityMode::FullAccess, "full_access" },
)]
fn mode_strings_round_trip(mode: SecurityMode, text: &str) {
    assert_eq!(mode.as_str(), text);
    assert_eq!(SecurityMode::parse(text), Some(mode));
    let json = serde_json::to_string(&mode).unwrap();
    assert_eq!(json, format!("\"{text}\""));
}

#[test]
fn unknown_mode_string_is_rejected() {
    assert_eq!(SecurityMode::parse("yolo"), None);
}
