// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! herd-config: operator-authored instance configuration
//!
//! One JSON file per instance under `instances/<name>/config.json`. Parsing
//! is serde; `validate()` collects every field violation so the operator
//! sees all problems in one pass.

mod error;
mod instance;
mod loader;
mod paths;

pub use error::ConfigError;
pub use instance::{
    BinarySelector, GpuBackend, GpuConfig, HealthcheckConfig, InstanceConfig, LogsConfig,
    ModelConfig, ProbeKind, RestartPolicy, ServerConfig,
};
pub use loader::{config_fingerprint, delete_instance, discover_instances, load_instance, save_instance};
pub use paths::ProjectDirs;
