//! Engine counters.
//!
//! Plain atomics updated on the hot path; [`OrchestrationMetrics::snapshot`] gives a
//! serializable copy for the admin surface.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct OrchestrationMetrics {
    instances_started: AtomicU64,
    instances_completed: AtomicU64,
    instances_failed: AtomicU64,
    instances_cancelled: AtomicU64,
    steps_dispatched: AtomicU64,
    step_successes: AtomicU64,
    step_failures: AtomicU64,
    step_timeouts: AtomicU64,
    retries_scheduled: AtomicU64,
    registry_backoffs: AtomicU64,
    duplicates_discarded: AtomicU64,
    results_discarded: AtomicU64,
    cas_conflicts: AtomicU64,
    publish_failures: AtomicU64,
    steps_skipped: AtomicU64,
    dispatches_deferred: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub instances_started: u64,
    pub instances_completed: u64,
    pub instances_failed: u64,
    pub instances_cancelled: u64,
    pub steps_dispatched: u64,
    pub step_successes: u64,
    pub step_failures: u64,
    pub step_timeouts: u64,
    pub retries_scheduled: u64,
    pub registry_backoffs: u64,
    pub duplicates_discarded: u64,
    /// Results for unknown or already-terminal instances
    pub results_discarded: u64,
    pub cas_conflicts: u64,
    pub publish_failures: u64,
    /// Steps passed over because their payload condition did not hold
    pub steps_skipped: u64,
    /// Dispatches postponed to a recovery timer after a store error
    pub dispatches_deferred: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl OrchestrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        bump(&self.instances_started);
    }

    pub fn record_completed(&self) {
        bump(&self.instances_completed);
    }

    pub fn record_failed(&self) {
        bump(&self.instances_failed);
    }

    pub fn record_cancelled(&self) {
        bump(&self.instances_cancelled);
    }

    pub fn record_dispatch(&self) {
        bump(&self.steps_dispatched);
    }

    pub fn record_step_success(&self) {
        bump(&self.step_successes);
    }

    pub fn record_step_failure(&self) {
        bump(&self.step_failures);
    }

    pub fn record_step_timeout(&self) {
        bump(&self.step_timeouts);
    }

    pub fn record_retry(&self) {
        bump(&self.retries_scheduled);
    }

    pub fn record_registry_backoff(&self) {
        bump(&self.registry_backoffs);
    }

    pub fn record_duplicate(&self) {
        bump(&self.duplicates_discarded);
    }

    pub fn record_discarded(&self) {
        bump(&self.results_discarded);
    }

    pub fn record_cas_conflict(&self) {
        bump(&self.cas_conflicts);
    }

    pub fn record_publish_failure(&self) {
        bump(&self.publish_failures);
    }

    pub fn record_skipped(&self) {
        bump(&self.steps_skipped);
    }

    pub fn record_deferred_dispatch(&self) {
        bump(&self.dispatches_deferred);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            instances_started: load(&self.instances_started),
            instances_completed: load(&self.instances_completed),
            instances_failed: load(&self.instances_failed),
            instances_cancelled: load(&self.instances_cancelled),
            steps_dispatched: load(&self.steps_dispatched),
            step_successes: load(&self.step_successes),
            step_failures: load(&self.step_failures),
            step_timeouts: load(&self.step_timeouts),
            retries_scheduled: load(&self.retries_scheduled),
            registry_backoffs: load(&self.registry_backoffs),
            duplicates_discarded: load(&self.duplicates_discarded),
            results_discarded: load(&self.results_discarded),
            cas_conflicts: load(&self.cas_conflicts),
            publish_failures: load(&self.publish_failures),
            steps_skipped: load(&self.steps_skipped),
            dispatches_deferred: load(&self.dispatches_deferred),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = OrchestrationMetrics::new();
        metrics.record_started();
        metrics.record_dispatch();
        metrics.record_dispatch();
        metrics.record_duplicate();
        metrics.record_cas_conflict();

        let snap = metrics.snapshot();
        assert_eq!(snap.instances_started, 1);
        assert_eq!(snap.steps_dispatched, 2);
        assert_eq!(snap.duplicates_discarded, 1);
        assert_eq!(snap.cas_conflicts, 1);
        assert_eq!(snap.publish_failures, 0);
    }
}
