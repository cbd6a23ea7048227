// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with jitter
//!
//! Used for restart scheduling and for spacing health checks against a
//! failing endpoint. Jitter spreads simultaneous retries apart so a host
//! full of instances does not reconnect in lockstep.

use rand::Rng;
use std::time::Duration;

/// Smallest delay ever returned, jitter included.
const MIN_DELAY_SECS: f64 = 0.1;

/// Parameters for exponential backoff.
///
/// `delay(attempt) = min(max, base * multiplier^attempt)`, then scaled by a
/// random factor in `[1 - jitter, 1 + jitter]` and clamped to at least 0.1 s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`. 0 disables jitter.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given attempt without jitter applied.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let secs = (self.base.as_secs_f64() * factor).min(self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Jittered delay for the given attempt, clamped to `[0.1s, max]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt).as_secs_f64();
        let jittered = if self.jitter > 0.0 {
            let spread = raw * self.jitter;
            raw + rand::rng().random_range(-spread..=spread)
        } else {
            raw
        };
        Duration::from_secs_f64(jittered.clamp(MIN_DELAY_SECS, self.max.as_secs_f64()))
    }

    /// First `count` raw delays, for display and debugging.
    pub fn preview(&self, count: u32) -> Vec<Duration> {
        (0..count).map(|i| self.raw_delay(i)).collect()
    }
}

/// Attempt counter paired with a policy.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: BackoffPolicy,
    attempt: u32,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for the current attempt, advancing the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Check-interval scheduling for the health monitor.
///
/// While an instance keeps passing, checks run at the configured interval.
/// Consecutive failures stretch the interval with the backoff policy so a
/// dying endpoint is not hammered.
#[derive(Debug, Clone)]
pub struct CheckIntervalBackoff {
    normal_interval: Duration,
    state: BackoffState,
}

impl CheckIntervalBackoff {
    pub fn new(normal_interval: Duration, policy: BackoffPolicy) -> Self {
        Self {
            normal_interval,
            state: BackoffState::new(policy),
        }
    }

    /// Interval until the next check given the last check's outcome.
    pub fn next_interval(&mut self, last_success: bool) -> Duration {
        if last_success {
            self.state.reset();
            return self.normal_interval;
        }
        self.state.next_delay()
    }

    pub fn failures(&self) -> u32 {
        self.state.attempt()
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
