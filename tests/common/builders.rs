use chrono::Utc;
use serde_json::json;

use orquestador::config::{
    BackoffConfig, EngineConfig, OrquestadorConfig, RegistryConfig, TransportConfig,
};
use orquestador::models::{
    StepDefinition, StepOutcome, StepResult, WorkflowDefinition, WorkflowInstance,
};
use orquestador::registry::{InMemoryDiscovery, ServiceEndpoint};

/// Backoff tuned for tests: millisecond delays, no jitter
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        base_delay_ms: 10,
        multiplier: 2.0,
        max_delay_ms: 80,
        jitter_enabled: false,
        jitter_max_percentage: 0.0,
        registry_base_delay_ms: 10,
        registry_max_delay_ms: 40,
        max_registry_retries: 3,
    }
}

/// Configuration with short timers everywhere and no definitions
pub fn fast_config() -> OrquestadorConfig {
    OrquestadorConfig {
        engine: EngineConfig {
            publish_retries: 2,
            publish_retry_delay_ms: 5,
            publish_retry_multiplier: 2.0,
            publish_retry_max_delay_ms: 20,
            dispatch_recovery_delay_ms: 20,
            max_cas_retries: 5,
            result_consumers: 1,
        },
        backoff: fast_backoff(),
        registry: RegistryConfig {
            cache_ttl_ms: 1_000,
            staleness_bound_ms: 5_000,
            resolve_timeout_ms: 200,
            poll_interval_ms: 60_000,
            static_services: Vec::new(),
        },
        transport: TransportConfig {
            redelivery_delay_ms: 10,
            max_deliveries: 3,
        },
        ..OrquestadorConfig::default()
    }
}

/// `name@1` with one step per (step, capability) pair
pub fn linear_definition(name: &str, steps: &[(&str, &str)]) -> WorkflowDefinition {
    WorkflowDefinition::new(
        name,
        "1",
        steps
            .iter()
            .map(|(step, capability)| {
                StepDefinition::new(*step, *capability)
                    .with_max_retries(3)
                    .with_timeout_ms(5_000)
            })
            .collect(),
    )
}

/// Three steps on three capabilities: `a` on alpha, `b` on beta, `c` on gamma
pub fn three_step_definition() -> WorkflowDefinition {
    linear_definition("three_steps", &[("a", "alpha"), ("b", "beta"), ("c", "gamma")])
}

/// Discovery with one live endpoint per capability
pub fn discovery_for(capabilities: &[&str]) -> InMemoryDiscovery {
    let discovery = InMemoryDiscovery::new();
    for (i, capability) in capabilities.iter().enumerate() {
        discovery.register(ServiceEndpoint::new(
            *capability,
            format!("{capability}-1"),
            "127.0.0.1",
            4000 + i as u16,
        ));
    }
    discovery
}

/// Result answering the instance's outstanding attempt
pub fn result_for_outstanding(instance: &WorkflowInstance, outcome: StepOutcome) -> StepResult {
    let outstanding = instance
        .outstanding
        .as_ref()
        .expect("instance has an outstanding attempt");
    let error = match outcome {
        StepOutcome::Success => None,
        StepOutcome::Failure => Some("downstream rejected the request".to_string()),
        StepOutcome::Timeout => Some("downstream timed out".to_string()),
    };
    StepResult {
        instance_id: instance.instance_id,
        step_name: outstanding.step_name.clone(),
        attempt: outstanding.attempt,
        idempotency_key: outstanding.idempotency_key.clone(),
        outcome,
        payload: json!({ "answered": outstanding.step_name }),
        error,
        correlation_id: instance.correlation_id.clone(),
        completed_at: Utc::now(),
    }
}
