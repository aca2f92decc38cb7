use thiserror::Error;

/// Errors raised while applying workflow events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Instance is already terminal ({state}); event {event} rejected")]
    AlreadyTerminal { state: String, event: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
