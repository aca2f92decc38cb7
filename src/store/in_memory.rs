use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{StoreError, StoreResult, WorkflowStateStore};
use crate::models::WorkflowInstance;
use crate::state_machine::WorkflowStatus;

/// Process-local state store; the default for tests and single-node deployments
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    instances: Arc<DashMap<Uuid, WorkflowInstance>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl WorkflowStateStore for InMemoryStateStore {
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<u64> {
        let new_version = instance.version + 1;

        match self.instances.entry(instance.instance_id) {
            Entry::Vacant(vacant) => {
                if instance.version != 0 {
                    return Err(StoreError::conflict(instance.instance_id, instance.version));
                }
                let mut stored = instance.clone();
                stored.version = new_version;
                vacant.insert(stored);
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().version != instance.version {
                    debug!(
                        instance_id = %instance.instance_id,
                        expected = instance.version,
                        actual = occupied.get().version,
                        "CAS conflict on save"
                    );
                    return Err(StoreError::conflict(instance.instance_id, instance.version));
                }
                let mut stored = instance.clone();
                stored.version = new_version;
                occupied.insert(stored);
            }
        }

        Ok(new_version)
    }

    async fn load(&self, instance_id: Uuid) -> StoreResult<Option<WorkflowInstance>> {
        Ok(self.instances.get(&instance_id).map(|e| e.value().clone()))
    }

    async fn list_by_status(&self, status: WorkflowStatus) -> StoreResult<Vec<WorkflowInstance>> {
        let mut found: Vec<WorkflowInstance> = self
            .instances
            .iter()
            .filter(|e| e.value().status == status)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|i| i.created_at);
        Ok(found)
    }

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, u64>> {
        let mut counts = HashMap::new();
        for entry in self.instances.iter() {
            *counts.entry(entry.value().status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
