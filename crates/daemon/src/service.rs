// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background service loops
//!
//! Three loops run until shutdown: the health-monitor tick, the
//! reconciliation pass, and a coarse event-retention purge. Each catches
//! its own failures, logs them, sleeps and continues; a broken loop must
//! never take the daemon down.

use herd_core::epoch_secs;
use herd_engine::{HealthMonitor, MonitorSettings, Reconciler, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Daemon-wide tuning.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub monitor: MonitorSettings,
    pub retention_days: u32,
    pub retention_sweep_interval: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings::default(),
            retention_days: 30,
            retention_sweep_interval: Duration::from_secs(6 * 3600),
        }
    }
}

/// The running daemon: owns the supervisor and its loops.
pub struct Daemon {
    supervisor: Arc<Supervisor>,
    reconciler: Reconciler,
    settings: DaemonSettings,
    shutdown_tx: watch::Sender<bool>,
}

impl Daemon {
    pub fn new(supervisor: Supervisor, reconciler: Reconciler, settings: DaemonSettings) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            supervisor: Arc::new(supervisor),
            reconciler,
            settings,
            shutdown_tx,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Signal every loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A handle that can signal shutdown after the daemon is consumed by
    /// [`Daemon::run`].
    pub fn shutdown_handle(&self) -> impl Fn() + Send + 'static {
        let tx = self.shutdown_tx.clone();
        move || {
            let _ = tx.send(true);
        }
    }

    /// Run all loops until shutdown is signalled.
    pub async fn run(self) {
        let mut monitor_rx = self.shutdown_tx.subscribe();
        let mut reconcile_rx = self.shutdown_tx.subscribe();
        let mut retention_rx = self.shutdown_tx.subscribe();

        let monitor_supervisor = self.supervisor.clone();
        let monitor_settings = self.settings.monitor.clone();
        let monitor_loop = tokio::spawn(async move {
            let mut monitor = HealthMonitor::new(monitor_settings);
            let interval = monitor.settings().tick_interval;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        monitor.tick(&monitor_supervisor).await;
                    }
                    _ = monitor_rx.changed() => break,
                }
            }
        });

        let reconciler = self.reconciler;
        let reconcile_loop = tokio::spawn(async move {
            let interval = reconciler.settings().interval;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = reconciler.run().await {
                            error!(error = %e, "reconciliation pass failed");
                        }
                    }
                    _ = reconcile_rx.changed() => break,
                }
            }
        });

        let retention_supervisor = self.supervisor.clone();
        let retention_days = self.settings.retention_days;
        let sweep_interval = self.settings.retention_sweep_interval;
        let retention_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(sweep_interval) => {
                        let cutoff = epoch_secs() - (retention_days as f64) * 86_400.0;
                        match retention_supervisor.db().purge_events_before(cutoff).await {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "purged expired events"),
                            Err(e) => error!(error = %e, "event retention purge failed"),
                        }
                    }
                    _ = retention_rx.changed() => break,
                }
            }
        });

        let _ = monitor_loop.await;
        let _ = reconcile_loop.await;
        let _ = retention_loop.await;
        info!("daemon loops stopped");
    }
}
