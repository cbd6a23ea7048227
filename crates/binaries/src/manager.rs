// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Install, removal and resolution of server builds

use crate::download::{
    dir_size, download_file, extract_archive, find_executables, sha256_file, ProgressFn,
    DOWNLOAD_TIMEOUT,
};
use crate::error::BinaryError;
use crate::registry::{BinaryEntry, RegistryManager, Variant};
use crate::releases::{build_download_url, ReleaseClient};
use chrono::Utc;
use herd_config::BinarySelector;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Orchestrates the registry, release client and downloader.
pub struct BinaryManager {
    registry: RegistryManager,
    releases: ReleaseClient,
    client: reqwest::Client,
}

impl BinaryManager {
    pub fn open(bins_dir: impl Into<PathBuf>) -> Result<Self, BinaryError> {
        Ok(Self {
            registry: RegistryManager::load(bins_dir)?,
            releases: ReleaseClient::new(),
            client: reqwest::Client::new(),
        })
    }

    /// Swap the release client (tests, mirrors).
    pub fn with_release_client(mut self, releases: ReleaseClient) -> Self {
        self.releases = releases;
        self
    }

    pub fn registry(&self) -> &RegistryManager {
        &self.registry
    }

    /// Install a build: resolve the tag, download, verify, extract into
    /// `bins/<uuid>/`, record in the registry. Any failure after the UUID
    /// is minted removes the partial directory.
    pub async fn install(
        &mut self,
        version: &str,
        variant: Variant,
        source_url: Option<&str>,
        pinned_sha256: Option<&str>,
        progress: Option<&ProgressFn>,
    ) -> Result<BinaryEntry, BinaryError> {
        info!(version, variant = %variant, "installing server build");

        let actual_version = if version == "latest" {
            let tag = self.releases.resolve_latest_tag().await?;
            info!(tag, "resolved 'latest'");
            tag
        } else {
            version.to_string()
        };

        let url = match source_url {
            Some(url) => url.to_string(),
            None => build_download_url(&actual_version, variant),
        };

        let id = Uuid::new_v4();
        let target_dir = self.registry.bins_dir().join(id.to_string());

        let result = self
            .fetch_verify_extract(&url, variant, pinned_sha256, progress, &target_dir)
            .await;

        let sha256 = match result {
            Ok(sha256) => sha256,
            Err(e) => {
                if target_dir.exists() {
                    let _ = std::fs::remove_dir_all(&target_dir);
                }
                return Err(e);
            }
        };

        let release = match self.releases.release_info(&actual_version).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "release metadata unavailable");
                None
            }
        };

        let entry = BinaryEntry {
            id,
            version: actual_version.clone(),
            variant,
            download_url: url,
            sha256: Some(sha256),
            installed_at: Utc::now(),
            path: PathBuf::from(id.to_string()),
            size_bytes: dir_size(&target_dir),
            executables: find_executables(&target_dir),
            release,
        };

        if let Err(e) = self.registry.add(entry.clone()) {
            let _ = std::fs::remove_dir_all(&target_dir);
            return Err(e);
        }

        info!(id = %id, version = %actual_version, "installed");
        Ok(entry)
    }

    async fn fetch_verify_extract(
        &self,
        url: &str,
        variant: Variant,
        pinned_sha256: Option<&str>,
        progress: Option<&ProgressFn>,
        target_dir: &Path,
    ) -> Result<String, BinaryError> {
        let staging = tempfile::tempdir()?;
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("archive{}", variant.archive_ext()));
        let archive_path = staging.path().join(file_name);

        download_file(&self.client, url, &archive_path, DOWNLOAD_TIMEOUT, progress).await?;

        let actual = sha256_file(&archive_path)?;
        if let Some(expected) = pinned_sha256 {
            let expected = expected.trim().to_lowercase();
            if expected != actual {
                return Err(BinaryError::ChecksumMismatch {
                    expected,
                    actual,
                });
            }
        }

        extract_archive(&archive_path, target_dir)?;
        Ok(actual)
    }

    /// Remove a build from the registry and delete its directory.
    pub fn uninstall(&mut self, id: Uuid) -> Result<BinaryEntry, BinaryError> {
        let removed = self.registry.remove(id)?;
        let dir = self.registry.bins_dir().join(id.to_string());
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        info!(id = %id, version = %removed.version, "uninstalled");
        Ok(removed)
    }

    /// Resolve a selector to an installed entry.
    ///
    /// Priority: explicit id (missing id logs a warning and falls
    /// through), `latest` by install date among the variant's entries, an
    /// exact `(version, variant)` match, then the registry default.
    pub fn resolve(&self, selector: Option<&BinarySelector>) -> Option<&BinaryEntry> {
        let registry = self.registry.registry();
        let Some(selector) = selector else {
            return registry.get_default();
        };

        if let Some(id) = selector.binary_id {
            if let Some(entry) = registry.get_by_id(id) {
                return Some(entry);
            }
            warn!(id = %id, "selector names a binary that is not installed");
        }

        let variant = selector
            .variant
            .as_deref()
            .and_then(|tag| Variant::parse(tag).ok())
            .unwrap_or_else(Variant::host_default);

        if let Some(version) = selector.version.as_deref() {
            if version == "latest" {
                return registry
                    .binaries
                    .iter()
                    .filter(|b| b.variant == variant)
                    .max_by_key(|b| b.installed_at);
            }
            if let Some(entry) = registry.get_by_version(version, variant) {
                return Some(entry);
            }
        }

        registry.get_default()
    }

    /// Path to the server executable for a selector, when resolvable.
    pub fn resolve_server_path(&self, selector: Option<&BinarySelector>) -> Option<PathBuf> {
        let entry = self.resolve(selector)?;
        self.registry.server_path(entry)
    }

    /// Check upstream for a newer tag than the given entry's.
    ///
    /// Tags are compared numerically after stripping the leading letter.
    pub async fn check_updates(&self, id: Uuid) -> Result<Option<String>, BinaryError> {
        let entry = self
            .registry
            .registry()
            .get_by_id(id)
            .ok_or(BinaryError::NotFound(id))?;

        let latest = self.releases.resolve_latest_tag().await?;
        match (tag_number(&entry.version), tag_number(&latest)) {
            (Some(current), Some(upstream)) if upstream > current => Ok(Some(latest)),
            _ => Ok(None),
        }
    }
}

/// Numeric part of a release tag (`b7572` → 7572).
pub(crate) fn tag_number(tag: &str) -> Option<u64> {
    tag.trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .ok()
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
