// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! herd-daemon library: pid-file handling, daemon logging and the
//! background service loops. The `herdd` binary wires these together.

pub mod logging;
pub mod pidfile;
pub mod service;

pub use pidfile::{PidFileError, PidFileGuard};
pub use service::{Daemon, DaemonSettings};
