//! # Retry Supervisor
//!
//! Pure retry decisions for failed steps and registry outages.
//!
//! ## Step retries
//!
//! A step may run `max_retries + 1` times. After the n-th failed attempt the delay is
//! `base * multiplier^(n-1)`, capped at `max_delay`, then jittered by up to
//! `jitter_max_percentage` in either direction. The jitter is drawn from an RNG seeded
//! with (instance, step, attempt) so a replayed decision yields the same delay.
//!
//! ## Registry backoff
//!
//! Registry failures are counted separately from step attempts and use their own base
//! delay, cap and limit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::config::BackoffConfig;
use crate::models::{StepDefinition, WorkflowInstance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetryDecision {
    /// Re-dispatch after the delay
    Retry(Duration),
    /// Give up; the instance fails
    Fail,
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Retry(delay) => Some(*delay),
            Self::Fail => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySupervisor {
    config: BackoffConfig,
}

impl Default for RetrySupervisor {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl RetrySupervisor {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Decide whether the step's most recent failed attempt may be retried
    pub fn should_retry(&self, instance: &WorkflowInstance, step: &StepDefinition) -> RetryDecision {
        let attempts = instance.attempts_for(&step.name);
        if attempts == 0 || attempts > step.max_retries {
            return RetryDecision::Fail;
        }

        let delay = self.step_delay(attempts);
        let delay = if self.config.jitter_enabled {
            apply_jitter(
                delay,
                self.config.jitter_max_percentage,
                jitter_seed(instance.instance_id, &step.name, attempts),
            )
        } else {
            delay
        };

        RetryDecision::Retry(delay)
    }

    /// Decide what to do after `failures` consecutive registry failures
    pub fn registry_backoff(&self, failures: u32) -> RetryDecision {
        if failures == 0 || failures > self.config.max_registry_retries {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry(exponential(
            self.config.registry_base_delay(),
            self.config.multiplier,
            failures,
            self.config.registry_max_delay(),
        ))
    }

    /// Un-jittered delay after the `attempt`-th failure
    pub fn step_delay(&self, attempt: u32) -> Duration {
        exponential(
            self.config.base_delay(),
            self.config.multiplier,
            attempt,
            self.config.max_delay(),
        )
    }
}

fn exponential(base: Duration, multiplier: f64, attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let millis = base.as_millis() as f64 * multiplier.powi(exponent);
    let capped = millis.min(cap.as_millis() as f64);
    if capped.is_finite() && capped > 0.0 {
        Duration::from_millis(capped as u64)
    } else {
        Duration::ZERO
    }
}

/// Stable seed for (instance, step, attempt)
fn jitter_seed(instance_id: Uuid, step_name: &str, attempt: u32) -> u64 {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let attempt_bytes = attempt.to_le_bytes();
    let bytes = instance_id
        .as_bytes()
        .iter()
        .chain(step_name.as_bytes())
        .chain(attempt_bytes.iter());
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn apply_jitter(delay: Duration, max_jitter: f64, seed: u64) -> Duration {
    let millis = delay.as_millis() as u64;
    let range = (millis as f64 * max_jitter) as u64;
    if range == 0 {
        return delay;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = rng.gen_range(0..=range);

    // Add or subtract jitter
    if rng.gen_bool(0.5) {
        Duration::from_millis(millis.saturating_add(jitter))
    } else {
        Duration::from_millis(millis.saturating_sub(jitter))
    }
}
