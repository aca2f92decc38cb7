use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created and persisted, first step not yet dispatched
    Pending,
    /// A step attempt is outstanding
    Running,
    /// The outstanding attempt failed; retry decision pending
    StepFailed,
    /// Waiting for a backoff timer before re-dispatch
    Retrying,
    /// All steps succeeded
    Completed,
    /// Retries exhausted or dispatch could not be completed
    Failed,
    /// Cancelled by an operator or caller
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 7] = [
        Self::Pending,
        Self::Running,
        Self::StepFailed,
        Self::Retrying,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the instance is waiting on downstream work or a timer
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }

    /// Check if this status counts as an error outcome
    pub fn is_error(&self) -> bool {
        matches!(self, Self::StepFailed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::StepFailed => "step_failed",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "step_failed" => Ok(Self::StepFailed),
            "retrying" => Ok(Self::Retrying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid workflow status: {s}")),
        }
    }
}

/// Default status for new instances
impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(!WorkflowStatus::StepFailed.is_terminal());
        assert!(!WorkflowStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_status_string_conversion() {
        for status in WorkflowStatus::ALL {
            assert_eq!(status.to_string().parse::<WorkflowStatus>().unwrap(), status);
        }
        assert!("in_progress".parse::<WorkflowStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&WorkflowStatus::StepFailed).unwrap();
        assert_eq!(json, "\"step_failed\"");

        let parsed: WorkflowStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, WorkflowStatus::StepFailed);
    }
}
