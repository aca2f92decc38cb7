//! Shared orchestration result types.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a step result was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// No instance with that id exists
    UnknownInstance,
    /// The instance already reached a terminal status
    Terminal,
    /// The result does not answer the outstanding attempt
    Duplicate,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownInstance => write!(f, "unknown_instance"),
            Self::Terminal => write!(f, "terminal"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// What the engine did with a step result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum ResultDisposition {
    /// Step succeeded; the next step is being dispatched
    Advanced { next_step: usize },
    /// Final step succeeded
    Completed,
    /// Step failed and another attempt is scheduled
    RetryScheduled { delay: Duration, next_attempt: u32 },
    /// Step failed with retries exhausted
    Failed { reason: String },
    Discarded { reason: DiscardReason },
}

impl ResultDisposition {
    pub fn discarded(reason: DiscardReason) -> Self {
        Self::Discarded { reason }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded { .. })
    }
}
