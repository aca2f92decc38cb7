use thiserror::Error;
use uuid::Uuid;

/// Workflow state store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Stored version differs from the version the caller loaded
    #[error("Concurrent modification of instance {instance_id}: expected version {expected_version}")]
    ConcurrentModification {
        instance_id: Uuid,
        expected_version: u64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record for instance {instance_id}: {reason}")]
    Corrupt { instance_id: Uuid, reason: String },
}

impl StoreError {
    pub fn conflict(instance_id: Uuid, expected_version: u64) -> Self {
        Self::ConcurrentModification {
            instance_id,
            expected_version,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
