// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! herd daemon (herdd)
//!
//! Background process running the health monitor, the reconciler and
//! event retention against the herd project directory. Typically started
//! by the `herd` CLI rather than invoked directly.

use herd_binaries::BinaryManager;
use herd_config::ProjectDirs;
use herd_daemon::{logging, pidfile::PidFileGuard, Daemon, DaemonSettings};
use herd_engine::{ReconcileSettings, Reconciler, Supervisor};
use herd_storage::{migrate_legacy_state, sweep_temp_files, LockManager, StateDb};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("herdd {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                println!("herdd {}", env!("CARGO_PKG_VERSION"));
                println!("herd daemon - supervises local inference-server instances");
                println!();
                println!("USAGE:");
                println!("    herdd");
                println!();
                println!("State lives under $HERD_HOME (default ~/.herd). The daemon");
                println!("is typically started by the `herd` CLI.");
                return;
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: herdd [--help | --version]");
                std::process::exit(herd_core::ExitCode::UsageError.code());
            }
        }
    }

    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let dirs = ProjectDirs::from_env();
    if let Err(e) = dirs.ensure() {
        eprintln!("error: cannot create project directories: {e}");
        return herd_core::ExitCode::DaemonStartFailed.code();
    }

    // Log setup happens before anything interesting so failures are visible
    let log_path = dirs.daemon_log_path();
    logging::rotate_log_if_needed(&log_path, logging::MAX_LOG_BYTES);
    if let Err(e) = logging::write_startup_marker(&log_path) {
        eprintln!("error: cannot write daemon log: {e}");
        return herd_core::ExitCode::DaemonStartFailed.code();
    }
    let _log_guard = match logging::init(&log_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot initialize logging: {e}");
            return herd_core::ExitCode::DaemonStartFailed.code();
        }
    };

    let _pid_guard = match PidFileGuard::acquire(&dirs.daemon_pid_path()) {
        Ok(guard) => guard,
        Err(e) => {
            error!(error = %e, "refusing to start");
            eprintln!("error: {e}");
            return herd_core::ExitCode::DaemonAlreadyRunning.code();
        }
    };

    info!(root = %dirs.root().display(), "starting herd daemon");

    // Crash leftovers from interrupted atomic saves
    sweep_temp_files(&dirs.bins_dir());

    let db = match StateDb::open(&dirs.state_db_path()).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "cannot open state database");
            return herd_core::ExitCode::DaemonStartFailed.code();
        }
    };

    match migrate_legacy_state(&db, &dirs.instances_dir()).await {
        Ok(0) => {}
        Ok(imported) => info!(imported, "migrated legacy state files"),
        Err(e) => error!(error = %e, "legacy state migration failed"),
    }

    let locks = LockManager::new(dirs.locks_dir());
    locks.cleanup_stale();

    let binaries = match BinaryManager::open(dirs.bins_dir()) {
        Ok(binaries) => binaries,
        Err(e) => {
            error!(error = %e, "cannot open binary registry");
            return herd_core::ExitCode::DaemonStartFailed.code();
        }
    };

    let supervisor = Supervisor::new(dirs.clone(), db.clone(), locks.clone(), binaries);
    let reconciler = Reconciler::new(db, locks, ReconcileSettings::default());
    let daemon = Daemon::new(supervisor, reconciler, DaemonSettings::default());

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            return herd_core::ExitCode::DaemonStartFailed.code();
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "cannot install SIGINT handler");
            return herd_core::ExitCode::DaemonStartFailed.code();
        }
    };

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        shutdown();
    });

    daemon.run().await;
    info!("herd daemon stopped");
    herd_core::ExitCode::Success.code()
}
