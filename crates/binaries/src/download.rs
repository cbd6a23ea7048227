// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive download and safe extraction
//!
//! Downloads stream to disk in chunks with progress reporting. Extraction
//! guards against zip bombs (declared-size limit checked before any byte
//! is written) and tar path traversal (absolute or `..` members rejected).

use crate::error::BinaryError;
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path};
use std::time::Duration;
use tracing::{debug, info};

/// Default total download timeout.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Declared-size ceiling for zip archives (bomb guard).
pub const MAX_ZIP_DECLARED_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Progress callback: `(downloaded_bytes, total_bytes_if_known)`.
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Stream `url` into `dest`, following redirects, reporting progress.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
    progress: Option<&ProgressFn>,
) -> Result<(), BinaryError> {
    info!(url, dest = %dest.display(), "downloading");
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| BinaryError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(BinaryError::Download {
            url: url.to_string(),
            message: format!("HTTP {status}"),
        });
    }

    let total = response.content_length();
    let mut stream = response.bytes_stream();
    let mut file = File::create(dest)?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BinaryError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        if let Some(progress) = progress {
            progress(downloaded, total);
        }
    }
    file.sync_all()?;

    debug!(bytes = downloaded, "download complete");
    Ok(())
}

/// SHA-256 of a file, lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String, BinaryError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), BinaryError> {
    extract_zip_with_limit(archive_path, dest, MAX_ZIP_DECLARED_BYTES)
}

fn extract_zip_with_limit(
    archive_path: &Path,
    dest: &Path,
    limit_bytes: u64,
) -> Result<(), BinaryError> {
    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| BinaryError::InvalidArchive(e.to_string()))?;

    // Bomb guard: declared uncompressed sizes, before extracting anything
    let mut declared: u64 = 0;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| BinaryError::InvalidArchive(e.to_string()))?;
        declared = declared.saturating_add(entry.size());
    }
    if declared > limit_bytes {
        return Err(BinaryError::ArchiveTooLarge {
            declared_bytes: declared,
            limit_bytes,
        });
    }

    std::fs::create_dir_all(dest)?;
    archive
        .extract(dest)
        .map_err(|e| BinaryError::InvalidArchive(e.to_string()))?;
    info!(files = archive.len(), dest = %dest.display(), "zip extracted");
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), BinaryError> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    std::fs::create_dir_all(dest)?;

    let entries = archive
        .entries()
        .map_err(|e| BinaryError::InvalidArchive(e.to_string()))?;
    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| BinaryError::InvalidArchive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| BinaryError::InvalidArchive(e.to_string()))?
            .into_owned();

        if path.is_absolute()
            || path.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(BinaryError::UnsafeArchivePath(path.display().to_string()));
        }

        entry
            .unpack_in(dest)
            .map_err(|e| BinaryError::InvalidArchive(e.to_string()))?;
        count += 1;
    }
    info!(files = count, dest = %dest.display(), "tar.gz extracted");
    Ok(())
}

/// Extract an archive by filename extension. Unknown extensions are a
/// download error, not a guess.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), BinaryError> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        extract_zip(archive_path, dest)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest)
    } else {
        Err(BinaryError::UnsupportedArchive(name))
    }
}

/// Total size of all files under `path`.
pub fn dir_size(path: &Path) -> u64 {
    fn walk(path: &Path, total: &mut u64) {
        let Ok(entries) = std::fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                walk(&p, total);
            } else if let Ok(meta) = p.metadata() {
                *total += meta.len();
            }
        }
    }
    let mut total = 0;
    walk(path, &mut total);
    total
}

/// File names under `dir` (recursively) that look executable: `.exe`
/// suffix or an executable permission bit. Sorted and unique.
pub fn find_executables(dir: &Path) -> Vec<String> {
    fn walk(dir: &Path, found: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, found);
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let is_exe_suffix = name.to_lowercase().ends_with(".exe");
            let is_unix_exec = {
                use std::os::unix::fs::PermissionsExt;
                path.metadata()
                    .map(|m| m.permissions().mode() & 0o111 != 0)
                    .unwrap_or(false)
            };
            if is_exe_suffix || is_unix_exec {
                found.push(name);
            }
        }
    }

    let mut found = Vec::new();
    walk(dir, &mut found);
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
