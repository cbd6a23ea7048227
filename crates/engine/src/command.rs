// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server command-line composition

use herd_config::{GpuBackend, InstanceConfig};
use std::path::Path;

/// Compose the child's argv: executable, positional model path, the
/// standard serving flags, accelerator flags, then operator extras.
pub fn build_command(config: &InstanceConfig, server_path: &Path) -> Vec<String> {
    let mut cmd = vec![
        server_path.display().to_string(),
        config.model.path.display().to_string(),
        "--host".to_string(),
        config.server.host.clone(),
        "--port".to_string(),
        config.server.port.to_string(),
        "--ctx-size".to_string(),
        config.model.context_size.to_string(),
        "--batch-size".to_string(),
        config.model.batch_size.to_string(),
        "--threads".to_string(),
        config.model.threads.to_string(),
        "--parallel".to_string(),
        config.server.parallel.to_string(),
    ];

    if config.gpu.backend != GpuBackend::Cpu {
        cmd.push("--n-gpu-layers".to_string());
        cmd.push(config.gpu.layers.to_string());
    }

    cmd.extend(config.args.iter().cloned());
    cmd
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
