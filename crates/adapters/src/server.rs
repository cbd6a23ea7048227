// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inference-server health endpoint interpretation
//!
//! The server exposes `GET /health` returning JSON with at least a
//! `status` field (`ok`, `loading`, ...) and optional slot counters. Some
//! builds only serve `/v1/health`; that path is tried when the primary
//! connection is refused.

use herd_core::HealthStatus;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Raw health payload from the server.
#[derive(Debug, Deserialize)]
struct HealthPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    slots_idle: Option<u64>,
    #[serde(default)]
    slots_processing: Option<u64>,
}

/// Interpreted health of a server endpoint.
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub health: HealthStatus,
    pub message: String,
    pub elapsed_ms: f64,
    pub slots_idle: Option<u64>,
    pub slots_processing: Option<u64>,
}

impl ServerHealth {
    fn unreachable(elapsed_ms: f64, message: String) -> Self {
        Self {
            health: HealthStatus::Unhealthy,
            message,
            elapsed_ms,
            slots_idle: None,
            slots_processing: None,
        }
    }
}

/// Query the server's health endpoint and interpret the response.
pub async fn check_server_health(host: &str, port: u16, timeout: Duration) -> ServerHealth {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default();

    let start = Instant::now();
    let primary = format!("http://{host}:{port}/health");

    let response = match client.get(&primary).send().await {
        Ok(response) => Ok(response),
        Err(e) if e.is_connect() => {
            // Older builds only expose the versioned path
            let fallback = format!("http://{host}:{port}/v1/health");
            client.get(&fallback).send().await
        }
        Err(e) => Err(e),
    };

    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_timeout() {
                format!("health check timed out after {}s", timeout.as_secs())
            } else if e.is_connect() {
                "connection refused".to_string()
            } else {
                format!("health check failed: {e}")
            };
            return ServerHealth::unreachable(elapsed, message);
        }
    };

    let status_code = response.status().as_u16();
    let payload: HealthPayload = match response.json().await {
        Ok(payload) => payload,
        Err(_) => {
            // A listening socket without a JSON body still means the
            // process is up but not serving yet.
            return ServerHealth {
                health: HealthStatus::Loading,
                message: format!("non-JSON health response (status {status_code})"),
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                slots_idle: None,
                slots_processing: None,
            };
        }
    };

    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
    let (health, message) = match payload.status.as_str() {
        "ok" => (HealthStatus::Healthy, "server healthy".to_string()),
        "loading" | "loading model" => {
            (HealthStatus::Loading, "model is loading".to_string())
        }
        other => (
            HealthStatus::Unhealthy,
            format!("server reports status '{other}'"),
        ),
    };

    ServerHealth {
        health,
        message,
        elapsed_ms: elapsed,
        slots_idle: payload.slots_idle,
        slots_processing: payload.slots_processing,
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
