//! # System Constants
//!
//! Topic naming, default limits and status groupings shared across the
//! orchestration core.

pub use crate::state_machine::WorkflowStatus;

/// Step defaults applied when a definition omits them
pub const DEFAULT_STEP_MAX_RETRIES: u32 = 3;
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;
/// How long a worker remembers a served attempt's result
pub const DEFAULT_WORKER_RESULT_RETENTION_MS: u64 = 600_000;

/// Topic naming conventions
pub mod topics {
    pub const STEP_REQUEST_SUFFIX: &str = "step.request";
    pub const STEP_RESULT_SUFFIX: &str = "step.result";
    pub const DEAD_LETTER_SUFFIX: &str = "dead_letter";

    /// Default topic carrying inbound domain events for triggers
    pub const DEFAULT_TRIGGER_TOPIC: &str = "orquestador.events";

    pub fn step_request(capability: &str) -> String {
        format!("{capability}.{STEP_REQUEST_SUFFIX}")
    }

    pub fn step_result(capability: &str) -> String {
        format!("{capability}.{STEP_RESULT_SUFFIX}")
    }

    pub fn dead_letter(topic: &str) -> String {
        format!("{topic}.{DEAD_LETTER_SUFFIX}")
    }
}

/// Engine lifecycle events emitted through logging
pub mod events {
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";

    pub const STEP_DISPATCHED: &str = "step.dispatched";
    pub const STEP_SUCCEEDED: &str = "step.succeeded";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRY_SCHEDULED: &str = "step.retry_scheduled";
    pub const STEP_TIMED_OUT: &str = "step.timed_out";
    pub const REGISTRY_BACKOFF: &str = "registry.backoff";
}

pub mod system {
    pub const ORQUESTADOR_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Environment variable naming the deployment environment
    pub const ENV_VAR: &str = "ORQUESTADOR_ENV";

    /// Environment variable overriding the configuration file path
    pub const CONFIG_PATH_ENV_VAR: &str = "ORQUESTADOR_CONFIG";

    /// Prefix for configuration overrides (`ORQUESTADOR_<SECTION>__<KEY>`)
    pub const CONFIG_ENV_PREFIX: &str = "ORQUESTADOR";

    pub const DEFAULT_CONFIG_PATH: &str = "config/orquestador.toml";
}

pub mod status_groups {
    use super::WorkflowStatus;

    pub const TERMINAL_STATES: &[WorkflowStatus] = &[
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
        WorkflowStatus::Cancelled,
    ];

    pub const IN_FLIGHT_STATES: &[WorkflowStatus] = &[
        WorkflowStatus::Pending,
        WorkflowStatus::Running,
        WorkflowStatus::StepFailed,
        WorkflowStatus::Retrying,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(topics::step_request("email"), "email.step.request");
        assert_eq!(topics::step_result("email"), "email.step.result");
        assert_eq!(
            topics::dead_letter("email.step.request"),
            "email.step.request.dead_letter"
        );
    }

    #[test]
    fn test_status_groups_partition_all_states() {
        for status in WorkflowStatus::ALL {
            let terminal = status_groups::TERMINAL_STATES.contains(&status);
            let in_flight = status_groups::IN_FLIGHT_STATES.contains(&status);
            assert!(terminal ^ in_flight, "{status} must be in exactly one group");
            assert_eq!(terminal, status.is_terminal());
        }
    }
}
