// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command handlers

use crate::{BinaryCommand, Command};
use herd_binaries::{BinaryManager, Variant};
use herd_config::ProjectDirs;
use herd_core::{EventLevel, ExitCode};
use herd_daemon::pidfile::running_daemon_pid;
use herd_engine::{spawn, Supervisor};
use herd_runner::{
    container_name, OrchestratorConfig, RunRequest, SecurityMode, TaskOrchestrator,
};
use herd_storage::{LockManager, StateDb};
use uuid::Uuid;

/// A user-visible failure with its exit code.
pub struct CliError {
    pub message: String,
    pub exit_code: ExitCode,
}

impl CliError {
    fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    fn usage(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::UsageError)
    }
}

impl From<herd_engine::EngineError> for CliError {
    fn from(e: herd_engine::EngineError) -> Self {
        Self::new(e.to_string(), e.exit_code())
    }
}

impl From<herd_storage::StorageError> for CliError {
    fn from(e: herd_storage::StorageError) -> Self {
        let code = if e.is_transient() {
            ExitCode::LockTimeout
        } else {
            ExitCode::StateCorrupt
        };
        Self::new(e.to_string(), code)
    }
}

impl From<herd_binaries::BinaryError> for CliError {
    fn from(e: herd_binaries::BinaryError) -> Self {
        let code = match &e {
            herd_binaries::BinaryError::ChecksumMismatch { .. } => ExitCode::ChecksumMismatch,
            herd_binaries::BinaryError::Download { .. } => ExitCode::DownloadFailed,
            herd_binaries::BinaryError::NotFound(_) => ExitCode::BinaryNotFound,
            _ => ExitCode::BinaryInvalid,
        };
        Self::new(e.to_string(), code)
    }
}

impl From<herd_runner::RunnerError> for CliError {
    fn from(e: herd_runner::RunnerError) -> Self {
        let code = match &e {
            herd_runner::RunnerError::SecurityRefused { .. } => ExitCode::PermissionDenied,
            herd_runner::RunnerError::Container(_) => ExitCode::GeneralError,
            _ => ExitCode::GeneralError,
        };
        Self::new(e.to_string(), code)
    }
}

async fn open_supervisor(dirs: &ProjectDirs) -> Result<Supervisor, CliError> {
    dirs.ensure()
        .map_err(|e| CliError::new(e.to_string(), ExitCode::GeneralError))?;
    let db = StateDb::open(&dirs.state_db_path()).await?;
    let locks = LockManager::new(dirs.locks_dir());
    let binaries = BinaryManager::open(dirs.bins_dir())?;
    Ok(Supervisor::new(dirs.clone(), db, locks, binaries))
}

fn print_record(record: &herd_core::RuntimeRecord) {
    println!(
        "{:<16} {:<9} {:<10} {:<8} {:<8} {}",
        record.name,
        record.status,
        record.health,
        record
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string()),
        record
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string()),
        record.uptime_str(),
    );
}

pub async fn dispatch(command: Command) -> Result<(), CliError> {
    let dirs = ProjectDirs::from_env();

    match command {
        Command::Start { name } => {
            let supervisor = open_supervisor(&dirs).await?;
            let record = supervisor.start(&name).await?;
            println!(
                "started '{}' (pid {}, port {})",
                name,
                record.pid.unwrap_or(0),
                record.port.unwrap_or(0)
            );
            Ok(())
        }
        Command::Stop { name, force } => {
            let supervisor = open_supervisor(&dirs).await?;
            supervisor
                .stop(&name, force, spawn::DEFAULT_STOP_TIMEOUT)
                .await?;
            println!("stopped '{name}'");
            Ok(())
        }
        Command::Restart { name, force } => {
            let supervisor = open_supervisor(&dirs).await?;
            let record = supervisor.restart(&name, force).await?;
            println!(
                "restarted '{}' (pid {}, restart #{})",
                name,
                record.pid.unwrap_or(0),
                record.restart_count
            );
            Ok(())
        }
        Command::Status { name } => {
            let supervisor = open_supervisor(&dirs).await?;
            let record = supervisor.status(&name).await?;
            print_record(&record);
            if !record.last_error.is_empty() {
                println!("last error: {}", record.last_error);
            }
            Ok(())
        }
        Command::List => {
            let supervisor = open_supervisor(&dirs).await?;
            let records = supervisor.list().await?;
            println!(
                "{:<16} {:<9} {:<10} {:<8} {:<8} {}",
                "NAME", "STATUS", "HEALTH", "PID", "PORT", "UPTIME"
            );
            for record in &records {
                print_record(record);
            }
            Ok(())
        }
        Command::Logs {
            name,
            lines,
            stderr,
        } => {
            let stream = if stderr { "stderr" } else { "stdout" };
            let text = spawn::tail_log(&dirs.instance_logs_dir(&name), stream, lines);
            if text.is_empty() {
                println!("(no {stream} logs for '{name}')");
            } else {
                println!("{text}");
            }
            Ok(())
        }
        Command::Events {
            instance,
            level,
            limit,
        } => {
            let db = StateDb::open(&dirs.state_db_path()).await?;
            let level = level.as_deref().map(EventLevel::parse);
            let events = db.recent_events(instance.as_deref(), level, limit).await?;
            for event in events {
                println!(
                    "{:<12.1} {:<8} {:<18} {:<12} {}",
                    event.ts,
                    event.level,
                    event.event_type,
                    event.instance.as_deref().unwrap_or("-"),
                    event.message,
                );
            }
            Ok(())
        }
        Command::Binary(binary) => dispatch_binary(&dirs, binary).await,
        Command::Run {
            task,
            repo,
            mode,
            verify,
            schema,
            timeout,
            provider,
            image,
            allow_full_access,
        } => {
            let mode = SecurityMode::parse(&mode)
                .ok_or_else(|| CliError::usage(format!("unknown security mode '{mode}'")))?;

            let mut request = RunRequest::new(provider, task, repo);
            request.security_mode = mode;
            request.verify = verify;
            request.output_schema = schema;
            request.timeout_secs = timeout;

            let orchestrator = TaskOrchestrator::new(
                herd_adapters::ContainerEngine::from_env(),
                OrchestratorConfig {
                    runs_root: dirs.runs_dir(),
                    image,
                    schemas_dir: Some(dirs.schemas_dir()),
                },
            );

            println!("run {} started", request.run_id);
            let result = orchestrator.execute(request, allow_full_access).await?;
            println!(
                "run {} finished: {} ({} files changed, {:.1}s)",
                result.run_id,
                result.status,
                result.files_changed.len(),
                result.duration_secs
            );
            if let Some(error) = &result.error {
                println!("error: {error}");
            }
            Ok(())
        }
        Command::Cancel { provider, run_id } => {
            let run_id = Uuid::parse_str(&run_id)
                .map_err(|_| CliError::usage(format!("'{run_id}' is not a run id")))?;
            let orchestrator = TaskOrchestrator::new(
                herd_adapters::ContainerEngine::from_env(),
                OrchestratorConfig {
                    runs_root: dirs.runs_dir(),
                    image: String::new(),
                    schemas_dir: None,
                },
            );
            orchestrator.cancel(&provider, run_id).await?;
            println!("cancelled {}", container_name(&provider, run_id));
            Ok(())
        }
        Command::Daemon => {
            match running_daemon_pid(&dirs.daemon_pid_path()) {
                Some(pid) => println!("daemon running (pid {pid})"),
                None => {
                    println!("daemon not running");
                    return Err(CliError::new(
                        "daemon not running",
                        ExitCode::DaemonNotRunning,
                    ));
                }
            }
            Ok(())
        }
    }
}

async fn dispatch_binary(dirs: &ProjectDirs, command: BinaryCommand) -> Result<(), CliError> {
    dirs.ensure()
        .map_err(|e| CliError::new(e.to_string(), ExitCode::GeneralError))?;
    let mut manager = BinaryManager::open(dirs.bins_dir())?;

    match command {
        BinaryCommand::Install {
            version,
            variant,
            url,
            sha256,
        } => {
            let variant = match variant {
                Some(tag) => Variant::parse(&tag)?,
                None => Variant::host_default(),
            };
            let progress = |done: u64, total: Option<u64>| {
                if let Some(total) = total {
                    eprint!("\rdownloading {done}/{total} bytes");
                }
            };
            let entry = manager
                .install(
                    &version,
                    variant,
                    url.as_deref(),
                    sha256.as_deref(),
                    Some(&progress),
                )
                .await?;
            eprintln!();
            println!("installed {} ({}) as {}", entry.version, entry.variant, entry.id);
            Ok(())
        }
        BinaryCommand::List => {
            let registry = manager.registry().registry();
            for entry in &registry.binaries {
                let default_marker = if registry.default_binary_id == Some(entry.id) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{default_marker} {} {:<10} {:<20} {} bytes",
                    entry.id, entry.version, entry.variant, entry.size_bytes
                );
            }
            Ok(())
        }
        BinaryCommand::Uninstall { id } => {
            let id = parse_uuid(&id)?;
            let removed = manager.uninstall(id)?;
            println!("uninstalled {} ({})", removed.version, removed.id);
            Ok(())
        }
        BinaryCommand::SetDefault { id } => {
            let id = parse_uuid(&id)?;
            // Route through the registry invariants
            let mut registry = herd_binaries::RegistryManager::load(dirs.bins_dir())?;
            registry.set_default(id)?;
            println!("default binary set to {id}");
            Ok(())
        }
        BinaryCommand::CheckUpdates { id } => {
            let id = parse_uuid(&id)?;
            match manager.check_updates(id).await? {
                Some(latest) => println!("update available: {latest}"),
                None => println!("up to date"),
            }
            Ok(())
        }
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, CliError> {
    Uuid::parse_str(s).map_err(|_| CliError::usage(format!("'{s}' is not a binary id")))
}
