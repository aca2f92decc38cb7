use serde::{Deserialize, Serialize};

/// Events that can trigger workflow status transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A step attempt was published
    Dispatch,
    /// The outstanding step succeeded and more steps remain
    Advance,
    /// The final step succeeded
    Complete,
    /// The outstanding step failed or timed out
    StepFailed(String),
    /// The supervisor granted another attempt after a backoff
    ScheduleRetry,
    /// Registry resolution failed; wait for the registry backoff
    RegistryBackoff,
    /// The named step's condition does not hold for the payload
    SkipStep(String),
    /// Terminal failure with reason
    Fail(String),
    /// Cancel the instance
    Cancel,
}

impl WorkflowEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Advance => "advance",
            Self::Complete => "complete",
            Self::StepFailed(_) => "step_failed",
            Self::ScheduleRetry => "schedule_retry",
            Self::RegistryBackoff => "registry_backoff",
            Self::SkipStep(_) => "skip_step",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::StepFailed(msg) | Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Free-form detail kept in the transition history
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::SkipStep(step) => Some(step),
            _ => self.error_message(),
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail(_) | Self::Cancel)
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    pub fn step_failed_with_error(error: impl Into<String>) -> Self {
        Self::StepFailed(error.into())
    }
}
