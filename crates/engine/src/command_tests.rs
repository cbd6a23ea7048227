// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use herd_config::{InstanceConfig, ModelConfig};
use std::path::PathBuf;

fn config() -> InstanceConfig {
    serde_json::from_value(serde_json::json!({
        "name": "gpt",
        "model": {
            "path": "/models/tiny.gguf",
            "context_size": 8192,
            "batch_size": 256,
            "threads": 6
        },
        "server": { "host": "127.0.0.1", "port": 8801, "parallel": 2 }
    }))
    .unwrap()
}

#[test]
fn model_path_is_positional_and_flags_follow() {
    let cmd = build_command(&config(), Path::new("/bins/uuid/llama-server"));
    assert_eq!(cmd[0], "/bins/uuid/llama-server");
    assert_eq!(cmd[1], "/models/tiny.gguf");

    let joined = cmd.join(" ");
    assert!(joined.contains("--host 127.0.0.1"));
    assert!(joined.contains("--port 8801"));
    assert!(joined.contains("--ctx-size 8192"));
    assert!(joined.contains("--batch-size 256"));
    assert!(joined.contains("--threads 6"));
    assert!(joined.contains("--parallel 2"));
}

#[test]
fn cpu_backend_has_no_gpu_flags() {
    let cmd = build_command(&config(), Path::new("llama-server"));
    assert!(!cmd.join(" ").contains("--n-gpu-layers"));
}

#[test]
fn accelerated_backend_offloads_layers() {
    let mut config = config();
    config.gpu.backend = herd_config::GpuBackend::Vulkan;
    config.gpu.layers = 33;
    let joined = build_command(&config, Path::new("llama-server")).join(" ");
    assert!(joined.contains("--n-gpu-layers 33"));
}

#[test]
fn operator_extras_come_last() {
    let mut config = config();
    config.args = vec!["--flash-attn".to_string(), "--mlock".to_string()];
    let cmd = build_command(&config, Path::new("llama-server"));
    assert_eq!(&cmd[cmd.len() - 2..], ["--flash-attn", "--mlock"]);
}

#[test]
fn model_config_is_reflected_verbatim() {
    let model = ModelConfig {
        path: PathBuf::from("/m/a.gguf"),
        context_size: 512,
        batch_size: 1,
        threads: 1,
    };
    let mut config = config();
    config.model = model;
    let joined = build_command(&config, Path::new("s")).join(" ");
    assert!(joined.contains("--ctx-size 512"));
    assert!(joined.contains("--batch-size 1"));
}
