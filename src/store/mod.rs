//! # Workflow State Store
//!
//! Durable record of workflow instances. Every write is a compare-and-swap on the
//! instance `version`:
//!
//! - insert requires `version == 0` and no existing record
//! - update requires the stored version to equal `instance.version`
//! - a successful save stores and returns `version + 1`
//!
//! Any mismatch is reported as [`StoreError::ConcurrentModification`] and the caller
//! reloads and re-evaluates.

pub mod errors;
pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::WorkflowInstance;
use crate::state_machine::WorkflowStatus;

pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryStateStore;
pub use postgres::PostgresStateStore;

#[async_trait]
pub trait WorkflowStateStore: Send + Sync {
    /// Persist `instance` if its version still matches; returns the new version
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<u64>;

    async fn load(&self, instance_id: Uuid) -> StoreResult<Option<WorkflowInstance>>;

    async fn list_by_status(&self, status: WorkflowStatus) -> StoreResult<Vec<WorkflowInstance>>;

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, u64>>;

    fn backend_name(&self) -> &'static str;
}
