// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading, saving and discovering instance configurations

use crate::error::ConfigError;
use crate::instance::InstanceConfig;
use crate::paths::ProjectDirs;
use sha2::{Digest, Sha256};

/// Load and validate one instance configuration.
pub fn load_instance(dirs: &ProjectDirs, name: &str) -> Result<InstanceConfig, ConfigError> {
    let path = dirs.instance_config_path(name);
    if !path.exists() {
        return Err(ConfigError::NotFound {
            name: name.to_string(),
            path,
        });
    }

    let text = std::fs::read_to_string(&path)?;
    let config: InstanceConfig =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

    let violations = config.validate();
    if !violations.is_empty() {
        return Err(ConfigError::Invalid {
            name: name.to_string(),
            violations,
        });
    }

    Ok(config)
}

/// Validate and persist an instance configuration.
pub fn save_instance(dirs: &ProjectDirs, config: &InstanceConfig) -> Result<(), ConfigError> {
    let violations = config.validate();
    if !violations.is_empty() {
        return Err(ConfigError::Invalid {
            name: config.name.clone(),
            violations,
        });
    }

    let dir = dirs.instance_dir(&config.name);
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(dirs.instance_config_path(&config.name), json)?;
    Ok(())
}

/// Delete an instance's configuration directory. Returns whether it existed.
pub fn delete_instance(dirs: &ProjectDirs, name: &str) -> Result<bool, ConfigError> {
    let dir = dirs.instance_dir(name);
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(dir)?;
    Ok(true)
}

/// Names of every instance that has a config file, sorted.
///
/// Entries that are not directories or are missing `config.json` are
/// skipped silently; a broken config is the caller's problem at load time.
pub fn discover_instances(dirs: &ProjectDirs) -> Result<Vec<String>, ConfigError> {
    let instances_dir = dirs.instances_dir();
    if !instances_dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(instances_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if dirs.instance_config_path(&name).exists() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Fingerprint of a configuration: SHA-256 over its canonical JSON.
///
/// Stored in the runtime record so a restart after a config edit is
/// distinguishable from a restart of the same configuration.
pub fn config_fingerprint(config: &InstanceConfig) -> Result<String, ConfigError> {
    let canonical = serde_json::to_vec(config)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
