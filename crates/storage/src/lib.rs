// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! herd-storage: durable state for the supervisor
//!
//! Three primitives: atomic file replacement for registry-style JSON files,
//! pid-stamped lock files for cross-process mutual exclusion, and a SQLite
//! database (WAL mode) holding runtime records and the append-only event log.

mod atomic;
mod db;
mod error;
mod lock;
mod migrate;

pub use atomic::{sweep_temp_files, write_atomic, write_atomic_json};
pub use db::StateDb;
pub use error::StorageError;
pub use lock::{
    LockGuard, LockInfo, LockManager, LockSet, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_RETRY_INTERVAL,
    DEFAULT_STALE_AFTER,
};
pub use migrate::migrate_legacy_state;
