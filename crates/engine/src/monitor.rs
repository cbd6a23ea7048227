// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health monitoring and policy restarts
//!
//! One loop iterates all configured instances at their check intervals,
//! probes the running ones, persists results, and triggers supervisor
//! restarts when the restart policy says so. Two backoffs are in play:
//! restart attempts space out exponentially with jitter, and the check
//! interval itself stretches while an endpoint keeps failing so a dying
//! server is not hammered.

use crate::error::EngineError;
use crate::supervisor::Supervisor;
use herd_adapters::{check_server_health, HealthProbe};
use herd_config::{HealthcheckConfig, ProbeKind, RestartPolicy};
use herd_core::event::kind;
use herd_core::{
    epoch_secs, BackoffPolicy, CheckIntervalBackoff, EventLevel, EventRecord, HealthStatus,
    InstanceStatus,
};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// How often the outer loop wakes up; per-instance pacing is finer.
    pub tick_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
        }
    }
}

/// Per-instance monitoring state.
struct InstanceHealthState {
    consecutive_failures: u32,
    restart_attempts: u32,
    last_restart_at: Option<Instant>,
    interval: CheckIntervalBackoff,
    next_check_at: Instant,
}

impl InstanceHealthState {
    fn new(config: &HealthcheckConfig) -> Self {
        let normal = Duration::from_secs(config.interval as u64);
        Self {
            consecutive_failures: 0,
            restart_attempts: 0,
            last_restart_at: None,
            interval: CheckIntervalBackoff::new(
                normal,
                BackoffPolicy {
                    base: normal,
                    max: normal.max(Duration::from_secs(60)),
                    multiplier: 2.0,
                    jitter: config.backoff_jitter,
                },
            ),
            next_check_at: Instant::now(),
        }
    }
}

/// Whether a policy restart is due.
///
/// All of: policy enabled, grace expired, consecutive failures at or past
/// the healthcheck retry threshold, attempts left, and the jittered
/// exponential delay since the last restart has elapsed.
pub(crate) fn restart_due(
    policy: &RestartPolicy,
    failure_threshold: u32,
    jitter: f64,
    in_grace: bool,
    consecutive_failures: u32,
    restart_attempts: u32,
    since_last_restart: Option<Duration>,
) -> bool {
    if !policy.enabled || in_grace {
        return false;
    }
    if consecutive_failures < failure_threshold {
        return false;
    }
    if restart_attempts >= policy.max_retries {
        return false;
    }
    match since_last_restart {
        None => true,
        Some(elapsed) => {
            let backoff = BackoffPolicy {
                base: Duration::from_secs_f64(policy.initial_delay),
                max: Duration::from_secs_f64(policy.max_delay),
                multiplier: policy.backoff_multiplier,
                jitter,
            };
            elapsed >= backoff.delay(restart_attempts.saturating_sub(1))
        }
    }
}

/// The periodic health monitor.
pub struct HealthMonitor {
    settings: MonitorSettings,
    states: HashMap<String, InstanceHealthState>,
}

impl HealthMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            states: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// One pass over every configured instance. Failures inside a single
    /// instance's check are logged and never abort the pass.
    pub async fn tick(&mut self, supervisor: &Supervisor) -> usize {
        let names = match herd_config::discover_instances(supervisor.dirs()) {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "instance discovery failed");
                return 0;
            }
        };

        let mut checked = 0;
        for name in names {
            match self.check_instance(supervisor, &name).await {
                Ok(true) => checked += 1,
                Ok(false) => {}
                Err(e) => warn!(instance = %name, error = %e, "health check pass failed"),
            }
        }
        checked
    }

    async fn check_instance(
        &mut self,
        supervisor: &Supervisor,
        name: &str,
    ) -> Result<bool, EngineError> {
        let config = supervisor.load_config(name)?;

        let Some(record) = supervisor.db().load_runtime(name).await? else {
            self.states.remove(name);
            return Ok(false);
        };
        if record.status != InstanceStatus::Running {
            self.states.remove(name);
            return Ok(false);
        }

        let state = self
            .states
            .entry(name.to_string())
            .or_insert_with(|| InstanceHealthState::new(&config.healthcheck));

        if Instant::now() < state.next_check_at {
            return Ok(false);
        }

        let in_grace = record
            .started_at
            .map(|t| epoch_secs() - t < config.healthcheck.start_period as f64)
            .unwrap_or(false);

        let (health, message) = probe_once(&config.healthcheck, &config.server.host, config.server.port).await;
        debug!(instance = name, health = %health, message = %message, "health checked");

        let success = health == HealthStatus::Healthy;
        let loading_in_grace = health == HealthStatus::Loading && in_grace;
        if success {
            state.consecutive_failures = 0;
            state.restart_attempts = 0;
        } else if !loading_in_grace {
            state.consecutive_failures += 1;
        }

        supervisor.db().record_health(name, health, &message).await?;
        if record.health != health {
            let level = match health {
                HealthStatus::Healthy | HealthStatus::Loading => EventLevel::Info,
                _ => EventLevel::Warning,
            };
            supervisor
                .db()
                .log_event(
                    &EventRecord::new(
                        kind::HEALTH_CHECK,
                        format!("health changed {} -> {health}", record.health),
                    )
                    .instance(name)
                    .level(level)
                    .meta(json!({ "from": record.health, "to": health, "message": message })),
                )
                .await?;
        }

        state.next_check_at =
            Instant::now() + state.interval.next_interval(success || loading_in_grace);

        let due = restart_due(
            &config.restart_policy,
            config.healthcheck.retries,
            config.healthcheck.backoff_jitter,
            in_grace,
            state.consecutive_failures,
            state.restart_attempts,
            state.last_restart_at.map(|t| t.elapsed()),
        );

        if due {
            info!(
                instance = name,
                failures = state.consecutive_failures,
                attempt = state.restart_attempts + 1,
                "restarting unhealthy instance"
            );
            supervisor
                .db()
                .log_event(
                    &EventRecord::new(
                        kind::RESTART_TRIGGERED,
                        format!(
                            "restarting after {} consecutive failures (attempt {})",
                            state.consecutive_failures,
                            state.restart_attempts + 1
                        ),
                    )
                    .instance(name)
                    .level(EventLevel::Warning),
                )
                .await?;

            state.restart_attempts += 1;
            state.last_restart_at = Some(Instant::now());
            state.consecutive_failures = 0;

            if let Err(e) = supervisor.restart(name, false).await {
                error!(instance = name, error = %e, "policy restart failed");
            }
        }

        Ok(true)
    }
}

/// Run the configured probe once and interpret the result.
///
/// HTTP probes against the default health path go through the server
/// health interpretation (which can distinguish `loading`); everything
/// else maps probe success to healthy/unhealthy.
async fn probe_once(config: &HealthcheckConfig, host: &str, port: u16) -> (HealthStatus, String) {
    if config.kind == ProbeKind::Http {
        let result =
            check_server_health(host, port, Duration::from_secs(config.timeout as u64)).await;
        return (result.health, result.message);
    }

    let probe = HealthProbe::from_config(config);
    let outcome = probe.check_with_retry(host, port).await;
    if outcome.success {
        (HealthStatus::Healthy, outcome.message)
    } else {
        (HealthStatus::Unhealthy, outcome.message)
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
