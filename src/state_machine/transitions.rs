//! Transition table for workflow instances.
//!
//! ```text
//! Pending  --Dispatch-->        Running
//! Retrying --Dispatch-->        Running
//! Running  --Advance-->         Running
//! Running  --Complete-->        Completed
//! Pending  --Complete-->        Completed   (every step skipped)
//! Pending|Running --SkipStep--> unchanged
//! Running  --StepFailed-->      StepFailed
//! StepFailed --ScheduleRetry--> Retrying
//! StepFailed --Fail-->          Failed
//! Pending|Running|Retrying --RegistryBackoff--> Retrying
//! Pending|Running|Retrying --Fail-->            Failed
//! any non-terminal --Cancel-->  Cancelled
//! ```

use super::errors::{StateMachineError, StateMachineResult};
use super::events::WorkflowEvent;
use super::states::WorkflowStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied transition, kept on the instance as an audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Determine the target status based on current status and event
pub fn determine_target_state(
    current: WorkflowStatus,
    event: &WorkflowEvent,
) -> StateMachineResult<WorkflowStatus> {
    use WorkflowStatus::*;

    if current.is_terminal() {
        return Err(StateMachineError::AlreadyTerminal {
            state: current.to_string(),
            event: event.event_type().to_string(),
        });
    }

    let target = match (current, event) {
        (Pending | Retrying, WorkflowEvent::Dispatch) => Running,

        (Running, WorkflowEvent::Advance) => Running,
        (Pending | Running, WorkflowEvent::Complete) => Completed,
        (Pending, WorkflowEvent::SkipStep(_)) => Pending,
        (Running, WorkflowEvent::SkipStep(_)) => Running,

        (Running, WorkflowEvent::StepFailed(_)) => StepFailed,
        (StepFailed, WorkflowEvent::ScheduleRetry) => Retrying,

        (Pending | Running | Retrying, WorkflowEvent::RegistryBackoff) => Retrying,

        (Pending | Running | StepFailed | Retrying, WorkflowEvent::Fail(_)) => Failed,

        (_, WorkflowEvent::Cancel) => Cancelled,

        (from, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

/// Check a transition without applying it
pub fn can_transition(current: WorkflowStatus, event: &WorkflowEvent) -> bool {
    determine_target_state(current, event).is_ok()
}
