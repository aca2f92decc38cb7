mod common;

use common::strategies::*;
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

use orquestador::models::{DefinitionRef, IdempotencyKey, StepDefinition, WorkflowInstance};
use orquestador::orchestration::{RetryDecision, RetrySupervisor};
use orquestador::state_machine::{can_transition, determine_target_state, WorkflowStatus};

fn instance_with_attempts(step: &str, attempts: u32) -> WorkflowInstance {
    let mut instance = WorkflowInstance::new(DefinitionRef::new("prop", "1"), json!({}), None);
    instance.attempts.insert(step.to_string(), attempts);
    instance
}

proptest! {
    #[test]
    fn test_terminal_status_is_never_left(events in prop::collection::vec(workflow_event_strategy(), 1..40)) {
        let mut instance = WorkflowInstance::new(DefinitionRef::new("prop", "1"), json!({}), None);
        let mut reached_terminal = None;

        for event in events {
            let before = instance.status;
            let allowed = can_transition(before, &event);
            match instance.apply(event) {
                Ok(after) => {
                    prop_assert!(allowed);
                    prop_assert!(reached_terminal.is_none(), "left terminal {:?}", reached_terminal);
                    if after.is_terminal() {
                        reached_terminal = Some(after);
                        prop_assert!(instance.outstanding.is_none());
                    }
                }
                Err(_) => {
                    prop_assert!(!allowed);
                    prop_assert_eq!(instance.status, before);
                }
            }
        }

        if let Some(terminal) = reached_terminal {
            prop_assert_eq!(instance.status, terminal);
        }
        // History forms an unbroken chain of statuses
        let chained = instance
            .transitions
            .windows(2)
            .all(|pair| pair[0].to == pair[1].from);
        prop_assert!(chained);
    }

    #[test]
    fn test_transition_table_agrees_with_terminal_flag(
        status in prop::sample::select(WorkflowStatus::ALL.to_vec()),
        event in workflow_event_strategy(),
    ) {
        let outcome = determine_target_state(status, &event);
        if status.is_terminal() {
            prop_assert!(outcome.is_err());
        }
        if let Ok(target) = outcome {
            prop_assert_eq!(target.is_terminal(), event.is_terminal());
        }
    }

    #[test]
    fn test_retry_delay_is_bounded_and_deterministic(
        config in backoff_config_strategy(),
        step_name in step_name_strategy(),
        max_retries in 0u32..8,
        attempts in 1u32..12,
    ) {
        let supervisor = RetrySupervisor::new(config.clone());
        let step = StepDefinition::new(step_name.clone(), "cap").with_max_retries(max_retries);
        let instance = instance_with_attempts(&step_name, attempts);

        let decision = supervisor.should_retry(&instance, &step);
        prop_assert_eq!(decision, supervisor.should_retry(&instance, &step));

        match decision {
            RetryDecision::Fail => prop_assert!(attempts > max_retries),
            RetryDecision::Retry(delay) => {
                prop_assert!(attempts <= max_retries);
                let cap = config.max_delay_ms as f64;
                let bound = if config.jitter_enabled {
                    cap * (1.0 + config.jitter_max_percentage) + 1.0
                } else {
                    cap
                };
                prop_assert!((delay.as_millis() as f64) <= bound, "{:?} above {}", delay, bound);
            }
        }
    }

    #[test]
    fn test_unjittered_delay_never_decreases(config in backoff_config_strategy(), attempt in 1u32..30) {
        let supervisor = RetrySupervisor::new(config.clone());
        let current = supervisor.step_delay(attempt);
        let next = supervisor.step_delay(attempt + 1);
        prop_assert!(next >= current);
        prop_assert!(next.as_millis() as u64 <= config.max_delay_ms);
    }

    #[test]
    fn test_registry_backoff_budget(config in backoff_config_strategy(), failures in 0u32..15) {
        let supervisor = RetrySupervisor::new(config.clone());
        match supervisor.registry_backoff(failures) {
            RetryDecision::Retry(delay) => {
                prop_assert!(failures >= 1 && failures <= config.max_registry_retries);
                prop_assert!(delay.as_millis() as u64 <= config.registry_max_delay_ms);
            }
            RetryDecision::Fail => {
                prop_assert!(failures == 0 || failures > config.max_registry_retries);
            }
        }
    }

    #[test]
    fn test_idempotency_keys_distinguish_attempts(
        step_a in step_name_strategy(),
        step_b in step_name_strategy(),
        attempt_a in 1u32..50,
        attempt_b in 1u32..50,
    ) {
        let instance_id = Uuid::new_v4();
        let a = IdempotencyKey::new(instance_id, &step_a, attempt_a);
        let b = IdempotencyKey::new(instance_id, &step_b, attempt_b);
        prop_assert_eq!(a == b, step_a == step_b && attempt_a == attempt_b);
        prop_assert_eq!(a, IdempotencyKey::new(instance_id, &step_a, attempt_a));
    }
}
