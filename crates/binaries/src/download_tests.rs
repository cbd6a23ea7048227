// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn make_zip(dir: &Path, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
    let path = dir.join("archive.zip");
    let file = File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn make_tar_gz(dir: &Path, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
    let path = dir.join("archive.tar.gz");
    let file = File::create(&path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, *name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    path
}

#[test]
fn zip_extracts_normally() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = make_zip(tmp.path(), &[("hello.txt", b"hi"), ("sub/nested.txt", b"deep")]);
    let dest = tmp.path().join("out");

    extract_archive(&archive, &dest).unwrap();
    assert_eq!(std::fs::read(dest.join("hello.txt")).unwrap(), b"hi");
    assert_eq!(std::fs::read(dest.join("sub/nested.txt")).unwrap(), b"deep");
}

#[test]
fn zip_over_declared_limit_is_rejected_before_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = make_zip(tmp.path(), &[("big.bin", &[0u8; 256])]);
    let dest = tmp.path().join("out");

    let err = extract_zip_with_limit(&archive, &dest, 16).unwrap_err();
    match err {
        BinaryError::ArchiveTooLarge { declared_bytes, limit_bytes } => {
            assert_eq!(declared_bytes, 256);
            assert_eq!(limit_bytes, 16);
        }
        other => panic!("expected ArchiveTooLarge, got {other:?}"),
    }
    // Nothing was written
    assert!(!dest.join("big.bin").exists());
}

#[test]
fn tar_gz_extracts_normally() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = make_tar_gz(tmp.path(), &[("bin/llama-server", b"ELF")]);
    let dest = tmp.path().join("out");

    extract_archive(&archive, &dest).unwrap();
    assert_eq!(std::fs::read(dest.join("bin/llama-server")).unwrap(), b"ELF");
}

#[test]
fn tar_member_with_parent_traversal_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = make_tar_gz(tmp.path(), &[("sub/../../escape.txt", b"evil")]);
    let dest = tmp.path().join("out");

    let err = extract_archive(&archive, &dest).unwrap_err();
    assert!(matches!(err, BinaryError::UnsafeArchivePath(_)), "{err:?}");
    assert!(!tmp.path().join("escape.txt").exists());
}

#[test]
fn unknown_extension_is_a_download_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("archive.rar");
    std::fs::write(&path, b"???").unwrap();
    assert!(matches!(
        extract_archive(&path, &tmp.path().join("out")).unwrap_err(),
        BinaryError::UnsupportedArchive(_)
    ));
}

#[test]
fn sha256_matches_known_vector() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("data");
    std::fs::write(&path, b"abc").unwrap();
    assert_eq!(
        sha256_file(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn dir_size_sums_recursively() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
    std::fs::write(tmp.path().join("a/x"), [0u8; 10]).unwrap();
    std::fs::write(tmp.path().join("a/b/y"), [0u8; 22]).unwrap();
    assert_eq!(dir_size(tmp.path()), 32);
}

#[test]
fn executables_found_by_mode_and_suffix() {
    use std::os::unix::fs::PermissionsExt;
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("llama-server.exe"), b"x").unwrap();
    std::fs::write(tmp.path().join("readme.md"), b"x").unwrap();
    let unix_bin = tmp.path().join("llama-server");
    std::fs::write(&unix_bin, b"x").unwrap();
    std::fs::set_permissions(&unix_bin, std::fs::Permissions::from_mode(0o755)).unwrap();

    let found = find_executables(tmp.path());
    assert_eq!(found, vec!["llama-server", "llama-server.exe"]);
}

#[tokio::test]
async fn download_streams_with_progress() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let body = vec![7u8; 4096];
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(&body).await;
        }
    });

    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("artifact.bin");
    let client = reqwest::Client::new();
    let seen = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
    let seen_in_cb = seen.clone();
    let progress = move |done: u64, total: Option<u64>| {
        assert_eq!(total, Some(4096));
        seen_in_cb.store(done, std::sync::atomic::Ordering::SeqCst);
    };

    download_file(
        &client,
        &format!("http://127.0.0.1:{port}/artifact.bin"),
        &dest,
        Duration::from_secs(5),
        Some(&progress),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 4096);
}

#[tokio::test]
async fn http_error_status_is_a_typed_download_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    });

    let tmp = tempfile::tempdir().unwrap();
    let client = reqwest::Client::new();
    let err = download_file(
        &client,
        &format!("http://127.0.0.1:{port}/missing"),
        &tmp.path().join("x"),
        Duration::from_secs(5),
        None,
    )
    .await
    .unwrap_err();

    match err {
        BinaryError::Download { message, .. } => assert!(message.contains("404"), "{message}"),
        other => panic!("expected Download, got {other:?}"),
    }
}
