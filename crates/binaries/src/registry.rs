// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UUID-keyed registry of installed server builds
//!
//! `bins/registry.json` holds the catalog; each installed build lives in
//! `bins/<uuid>/` next to a duplicated `version.json`. The registry file is
//! only ever replaced atomically, and a momentarily absent file reads as an
//! empty registry.

use crate::error::BinaryError;
use crate::releases::ReleaseInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const REGISTRY_FILENAME: &str = "registry.json";
pub const VERSION_FILENAME: &str = "version.json";
const SCHEMA_VERSION: &str = "1.0.0";

/// Closed set of platform/accelerator build tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "win-cpu-x64")]
    WinCpuX64,
    #[serde(rename = "win-cpu-arm64")]
    WinCpuArm64,
    #[serde(rename = "win-vulkan-x64")]
    WinVulkanX64,
    #[serde(rename = "win-cuda-12.4-x64")]
    WinCuda124X64,
    #[serde(rename = "win-cuda-13.1-x64")]
    WinCuda131X64,
    #[serde(rename = "win-hip-radeon-x64")]
    WinHipRadeonX64,
    #[serde(rename = "win-sycl-x64")]
    WinSyclX64,
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "linux-vulkan-x64")]
    LinuxVulkanX64,
    #[serde(rename = "linux-cuda-12.4-x64")]
    LinuxCuda124X64,
    #[serde(rename = "macos-arm64")]
    MacosArm64,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::WinCpuX64 => "win-cpu-x64",
            Variant::WinCpuArm64 => "win-cpu-arm64",
            Variant::WinVulkanX64 => "win-vulkan-x64",
            Variant::WinCuda124X64 => "win-cuda-12.4-x64",
            Variant::WinCuda131X64 => "win-cuda-13.1-x64",
            Variant::WinHipRadeonX64 => "win-hip-radeon-x64",
            Variant::WinSyclX64 => "win-sycl-x64",
            Variant::LinuxX64 => "linux-x64",
            Variant::LinuxVulkanX64 => "linux-vulkan-x64",
            Variant::LinuxCuda124X64 => "linux-cuda-12.4-x64",
            Variant::MacosArm64 => "macos-arm64",
        }
    }

    pub fn all() -> &'static [Variant] {
        &[
            Variant::WinCpuX64,
            Variant::WinCpuArm64,
            Variant::WinVulkanX64,
            Variant::WinCuda124X64,
            Variant::WinCuda131X64,
            Variant::WinHipRadeonX64,
            Variant::WinSyclX64,
            Variant::LinuxX64,
            Variant::LinuxVulkanX64,
            Variant::LinuxCuda124X64,
            Variant::MacosArm64,
        ]
    }

    pub fn parse(tag: &str) -> Result<Self, BinaryError> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.as_str() == tag)
            .ok_or_else(|| BinaryError::UnknownVariant(tag.to_string()))
    }

    /// Archive extension for release assets of this variant.
    pub fn archive_ext(&self) -> &'static str {
        if self.as_str().starts_with("win-") {
            ".zip"
        } else {
            ".tar.gz"
        }
    }

    /// Reasonable variant for the build host.
    pub fn host_default() -> Self {
        if cfg!(target_os = "windows") {
            Variant::WinVulkanX64
        } else if cfg!(target_os = "macos") {
            Variant::MacosArm64
        } else {
            Variant::LinuxX64
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One installed build. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryEntry {
    pub id: Uuid,
    /// Release tag, e.g. `b7572`.
    pub version: String,
    pub variant: Variant,
    pub download_url: String,
    /// Verified SHA-256 of the downloaded archive.
    pub sha256: Option<String>,
    pub installed_at: DateTime<Utc>,
    /// Directory relative to `bins/`, always `<uuid>/`.
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Discovered executable file names, sorted and unique.
    pub executables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseInfo>,
}

/// The persisted catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryRegistry {
    pub schema_version: String,
    pub binaries: Vec<BinaryEntry>,
    pub default_binary_id: Option<Uuid>,
}

impl Default for BinaryRegistry {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            binaries: Vec::new(),
            default_binary_id: None,
        }
    }
}

impl BinaryRegistry {
    pub fn get_by_id(&self, id: Uuid) -> Option<&BinaryEntry> {
        self.binaries.iter().find(|b| b.id == id)
    }

    /// First entry matching `(version, variant)`.
    pub fn get_by_version(&self, version: &str, variant: Variant) -> Option<&BinaryEntry> {
        self.binaries
            .iter()
            .find(|b| b.version == version && b.variant == variant)
    }

    pub fn get_default(&self) -> Option<&BinaryEntry> {
        self.get_by_id(self.default_binary_id?)
    }

    /// Add an entry. The first entry added becomes the default.
    pub fn add(&mut self, entry: BinaryEntry) -> Result<(), BinaryError> {
        if self.get_by_id(entry.id).is_some() {
            return Err(BinaryError::Duplicate(entry.id));
        }
        let id = entry.id;
        self.binaries.push(entry);
        if self.default_binary_id.is_none() {
            self.default_binary_id = Some(id);
        }
        Ok(())
    }

    /// Remove an entry. Removing the default promotes the first remaining
    /// entry, or clears the default when none remain.
    pub fn remove(&mut self, id: Uuid) -> Option<BinaryEntry> {
        let index = self.binaries.iter().position(|b| b.id == id)?;
        let removed = self.binaries.remove(index);
        if self.default_binary_id == Some(id) {
            self.default_binary_id = self.binaries.first().map(|b| b.id);
        }
        Some(removed)
    }

    pub fn set_default(&mut self, id: Uuid) -> bool {
        if self.get_by_id(id).is_none() {
            return false;
        }
        self.default_binary_id = Some(id);
        true
    }

    pub fn len(&self) -> usize {
        self.binaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }
}

/// Registry plus its on-disk home.
pub struct RegistryManager {
    bins_dir: PathBuf,
    registry: BinaryRegistry,
}

impl RegistryManager {
    /// Load the registry under `bins_dir`, sweeping stray temp files. A
    /// missing registry file reads as empty.
    pub fn load(bins_dir: impl Into<PathBuf>) -> Result<Self, BinaryError> {
        let bins_dir = bins_dir.into();
        herd_storage::sweep_temp_files(&bins_dir);

        let path = bins_dir.join(REGISTRY_FILENAME);
        let registry = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            debug!(path = %path.display(), "no registry file, starting empty");
            BinaryRegistry::default()
        };

        Ok(Self { bins_dir, registry })
    }

    pub fn bins_dir(&self) -> &Path {
        &self.bins_dir
    }

    pub fn registry(&self) -> &BinaryRegistry {
        &self.registry
    }

    fn save(&self) -> Result<(), BinaryError> {
        herd_storage::write_atomic_json(&self.bins_dir.join(REGISTRY_FILENAME), &self.registry)?;
        debug!(count = self.registry.len(), "registry saved");
        Ok(())
    }

    /// Absolute directory of an entry.
    pub fn entry_dir(&self, entry: &BinaryEntry) -> PathBuf {
        self.bins_dir.join(&entry.path)
    }

    /// Path to the server executable inside an entry's directory, when the
    /// executable scan found one.
    pub fn server_path(&self, entry: &BinaryEntry) -> Option<PathBuf> {
        let name = entry
            .executables
            .iter()
            .find(|e| e.starts_with("llama-server"))?;
        Some(self.entry_dir(entry).join(name))
    }

    /// Add an entry: registry update, per-directory `version.json`, atomic
    /// registry save.
    pub fn add(&mut self, entry: BinaryEntry) -> Result<(), BinaryError> {
        let dir = self.bins_dir.join(&entry.path);
        std::fs::create_dir_all(&dir)?;
        herd_storage::write_atomic_json(&dir.join(VERSION_FILENAME), &entry)?;

        self.registry.add(entry)?;
        self.save()?;
        Ok(())
    }

    /// Remove an entry from the catalog (files are the manager's concern).
    pub fn remove(&mut self, id: Uuid) -> Result<BinaryEntry, BinaryError> {
        let removed = self.registry.remove(id).ok_or(BinaryError::NotFound(id))?;
        self.save()?;
        info!(id = %id, version = %removed.version, "removed registry entry");
        Ok(removed)
    }

    pub fn set_default(&mut self, id: Uuid) -> Result<(), BinaryError> {
        if !self.registry.set_default(id) {
            return Err(BinaryError::NotFound(id));
        }
        self.save()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
