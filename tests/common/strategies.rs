use proptest::prelude::*;

use orquestador::config::BackoffConfig;
use orquestador::state_machine::WorkflowEvent;

/// Strategy for step and capability names
pub fn step_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for failure details
pub fn error_detail_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .:_-]{0,40}"
}

/// Strategy covering every workflow event
pub fn workflow_event_strategy() -> impl Strategy<Value = WorkflowEvent> {
    prop_oneof![
        Just(WorkflowEvent::Dispatch),
        Just(WorkflowEvent::Advance),
        Just(WorkflowEvent::Complete),
        error_detail_strategy().prop_map(WorkflowEvent::StepFailed),
        Just(WorkflowEvent::ScheduleRetry),
        Just(WorkflowEvent::RegistryBackoff),
        step_name_strategy().prop_map(WorkflowEvent::SkipStep),
        error_detail_strategy().prop_map(WorkflowEvent::Fail),
        Just(WorkflowEvent::Cancel),
    ]
}

/// Strategy for valid backoff policies
pub fn backoff_config_strategy() -> impl Strategy<Value = BackoffConfig> {
    (
        1u64..2_000,
        1.0f64..4.0,
        0u64..60_000,
        any::<bool>(),
        0.0f64..=1.0,
        1u64..1_000,
        0u64..10_000,
        0u32..10,
    )
        .prop_map(
            |(base, multiplier, extra, jitter_enabled, jitter, registry_base, registry_extra, registry_retries)| {
                BackoffConfig {
                    base_delay_ms: base,
                    multiplier,
                    max_delay_ms: base + extra,
                    jitter_enabled,
                    jitter_max_percentage: jitter,
                    registry_base_delay_ms: registry_base,
                    registry_max_delay_ms: registry_base + registry_extra,
                    max_registry_retries: registry_retries,
                }
            },
        )
}
