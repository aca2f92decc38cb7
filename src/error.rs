//! # Orchestration Error Types
//!
//! Crate-level error taxonomy. Component modules keep their own `thiserror` enums
//! (`MessagingError`, `StoreError`, `RegistryError`, `StateMachineError`,
//! `ConfigurationError`) and convert into [`OrchestrationError`] at the engine boundary.

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the orchestration core
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// Caller referenced a workflow definition that was never registered
    #[error("Workflow definition not found: {definition}")]
    DefinitionNotFound { definition: String },

    #[error("Invalid workflow definition {definition}: {reason}")]
    InvalidDefinition { definition: String, reason: String },

    #[error("Workflow instance not found: {instance_id}")]
    InstanceNotFound { instance_id: Uuid },

    /// Registry could not resolve a capability within the staleness bound
    #[error("Registry unavailable for capability {capability}: {message}")]
    RegistryUnavailable { capability: String, message: String },

    #[error("Transport publish failure on {topic} after {attempts} attempts: {message}")]
    TransportPublishFailure {
        topic: String,
        attempts: u32,
        message: String,
    },

    /// Version check failed on save; the caller must reload and re-evaluate
    #[error("Concurrent modification of instance {instance_id}: expected version {expected_version}")]
    ConcurrentModification {
        instance_id: Uuid,
        expected_version: u64,
    },

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestrationError {
    pub fn definition_not_found(definition: impl Into<String>) -> Self {
        Self::DefinitionNotFound {
            definition: definition.into(),
        }
    }

    pub fn invalid_definition(definition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            definition: definition.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is transient and expected to clear on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable { .. }
                | Self::TransportPublishFailure { .. }
                | Self::ConcurrentModification { .. }
        )
    }

    /// Whether the error may be shown to an end user as-is
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::DefinitionNotFound { .. }
                | Self::InvalidDefinition { .. }
                | Self::InstanceNotFound { .. }
                | Self::RegistryUnavailable { .. }
        )
    }
}

impl From<StoreError> for OrchestrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrentModification {
                instance_id,
                expected_version,
            } => Self::ConcurrentModification {
                instance_id,
                expected_version,
            },
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<RegistryError> for OrchestrationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable {
                capability,
                message,
            } => Self::RegistryUnavailable {
                capability,
                message,
            },
            RegistryError::Timeout {
                capability,
                timeout_ms,
            } => Self::RegistryUnavailable {
                capability,
                message: format!("resolution timed out after {timeout_ms}ms"),
            },
            RegistryError::NoLiveEndpoint { capability } => Self::RegistryUnavailable {
                capability,
                message: "no live endpoint registered".to_string(),
            },
            RegistryError::Backend { message } => Self::RegistryUnavailable {
                capability: "unknown".to_string(),
                message,
            },
        }
    }
}

impl From<MessagingError> for OrchestrationError {
    fn from(err: MessagingError) -> Self {
        Self::Messaging(err.to_string())
    }
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_concurrent_modification() {
        let id = Uuid::new_v4();
        let err: OrchestrationError = StoreError::ConcurrentModification {
            instance_id: id,
            expected_version: 3,
        }
        .into();

        assert!(matches!(
            err,
            OrchestrationError::ConcurrentModification {
                expected_version: 3,
                ..
            }
        ));
        assert!(err.is_transient());
        assert!(!err.is_user_facing());
    }

    #[test]
    fn test_registry_timeout_maps_to_unavailable() {
        let err: OrchestrationError = RegistryError::Timeout {
            capability: "email".to_string(),
            timeout_ms: 250,
        }
        .into();

        match err {
            OrchestrationError::RegistryUnavailable {
                capability,
                message,
            } => {
                assert_eq!(capability, "email");
                assert!(message.contains("250ms"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = OrchestrationError::definition_not_found("signup@1");
        assert_eq!(
            err.to_string(),
            "Workflow definition not found: signup@1"
        );
        assert!(err.is_user_facing());
    }
}
