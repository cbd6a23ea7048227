// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn write_replaces_contents() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("registry.json");

    write_atomic(&path, b"first").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"first");

    write_atomic(&path, b"second").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"second");
}

#[test]
fn write_creates_parent_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("a/b/c.json");
    write_atomic(&path, b"{}").unwrap();
    assert!(path.exists());
}

#[test]
fn no_temp_file_remains_after_write() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("data.json");
    write_atomic(&path, b"payload").unwrap();
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn json_helper_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("value.json");
    write_atomic_json(&path, &json!({"k": [1, 2, 3]})).unwrap();

    let back: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(back["k"][2], 3);
}

#[test]
fn sweep_removes_only_temp_files() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("keep.json"), b"{}").unwrap();
    fs::write(tmp.path().join("a.tmp"), b"partial").unwrap();
    fs::write(tmp.path().join("b.tmp"), b"partial").unwrap();

    assert_eq!(sweep_temp_files(tmp.path()), 2);
    assert!(tmp.path().join("keep.json").exists());
    assert!(!tmp.path().join("a.tmp").exists());
}

#[test]
fn sweep_on_missing_dir_is_zero() {
    assert_eq!(sweep_temp_files(Path::new("/nonexistent/dir")), 0);
}
