// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! herd CLI
//!
//! Thin frontend over the library crates: instance lifecycle, binary
//! installs, the event log, containerized tool runs, and daemon status.
//! Exit codes follow the fixed ranges in `herd_core::ExitCode`.

mod commands;

use clap::{Parser, Subcommand};
use herd_core::ExitCode;

#[derive(Parser)]
#[command(name = "herd", version, about = "Supervise local inference servers and containerized LLM tool runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an instance
    Start { name: String },
    /// Stop an instance
    Stop {
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Restart an instance
    Restart {
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Show one instance's runtime state
    Status { name: String },
    /// List all configured instances
    List,
    /// Tail an instance's logs
    Logs {
        name: String,
        #[arg(long, default_value_t = 50)]
        lines: usize,
        #[arg(long)]
        stderr: bool,
    },
    /// Show recent events
    Events {
        #[arg(long)]
        instance: Option<String>,
        #[arg(long)]
        level: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Manage installed server binaries
    #[command(subcommand)]
    Binary(BinaryCommand),
    /// Run a task in an isolated container
    Run {
        task: String,
        #[arg(long, default_value = ".")]
        repo: String,
        #[arg(long, default_value = "workspace_write")]
        mode: String,
        #[arg(long)]
        verify: bool,
        #[arg(long)]
        schema: Option<String>,
        #[arg(long, default_value_t = 300)]
        timeout: u64,
        #[arg(long, default_value = "codex")]
        provider: String,
        #[arg(long, default_value = "tool-runner:latest")]
        image: String,
        /// Confirm a full-access (network-enabled) run
        #[arg(long)]
        allow_full_access: bool,
    },
    /// Cancel a running task
    Cancel {
        provider: String,
        run_id: String,
    },
    /// Daemon status
    Daemon,
}

#[derive(Subcommand)]
enum BinaryCommand {
    /// Download and install a server build
    Install {
        #[arg(default_value = "latest")]
        version: String,
        #[arg(long)]
        variant: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        sha256: Option<String>,
    },
    /// List installed builds
    List,
    /// Remove an installed build
    Uninstall { id: String },
    /// Make a build the default
    SetDefault { id: String },
    /// Check upstream for a newer version
    CheckUpdates { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match commands::dispatch(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("error: {}", e.message);
            e.exit_code
        }
    };
    std::process::exit(code.code());
}
