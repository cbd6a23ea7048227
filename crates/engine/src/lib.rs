// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! herd-engine: supervision of inference-server instances
//!
//! Composes configuration, storage, probes and the binary registry into
//! the operator-facing operations (start/stop/restart/status/list), the
//! reconciliation loop, and the health monitor that drives policy
//! restarts.

pub mod command;
mod error;
pub mod monitor;
pub mod reconcile;
pub mod spawn;
mod supervisor;

pub use error::EngineError;
pub use monitor::{HealthMonitor, MonitorSettings};
pub use reconcile::{ReconcileSettings, ReconcileSummary, Reconciler};
pub use supervisor::Supervisor;

/// Substring identifying managed server processes in the process table.
pub const SERVER_BINARY_PATTERN: &str = "llama-server";
