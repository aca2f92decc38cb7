//! Registry of immutable workflow definitions keyed by `name@version`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::models::{DefinitionRef, WorkflowDefinition};

#[derive(Debug, Default)]
pub struct WorkflowDefinitionRegistry {
    definitions: DashMap<DefinitionRef, Arc<WorkflowDefinition>>,
}

impl WorkflowDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition
    ///
    /// Re-registering identical content is a no-op; different content under an
    /// existing ref is rejected.
    pub fn register(&self, definition: WorkflowDefinition) -> OrchestrationResult<DefinitionRef> {
        let key = definition.definition_ref();
        definition
            .validate()
            .map_err(|reason| OrchestrationError::invalid_definition(key.to_string(), reason))?;

        match self.definitions.entry(key.clone()) {
            Entry::Occupied(existing) => {
                if **existing.get() == definition {
                    Ok(key)
                } else {
                    Err(OrchestrationError::invalid_definition(
                        key.to_string(),
                        "already registered with different content",
                    ))
                }
            }
            Entry::Vacant(slot) => {
                info!(
                    definition = %key,
                    steps = definition.steps.len(),
                    "📋 Workflow definition registered"
                );
                slot.insert(Arc::new(definition));
                Ok(key)
            }
        }
    }

    pub fn get(&self, definition: &DefinitionRef) -> OrchestrationResult<Arc<WorkflowDefinition>> {
        self.definitions
            .get(definition)
            .map(|e| e.value().clone())
            .ok_or_else(|| OrchestrationError::definition_not_found(definition.to_string()))
    }

    pub fn contains(&self, definition: &DefinitionRef) -> bool {
        self.definitions.contains_key(definition)
    }

    pub fn list(&self) -> Vec<DefinitionRef> {
        let mut refs: Vec<DefinitionRef> = self.definitions.iter().map(|e| e.key().clone()).collect();
        refs.sort();
        refs
    }

    /// Every capability referenced by any registered definition
    pub fn capabilities(&self) -> BTreeSet<String> {
        self.definitions
            .iter()
            .flat_map(|e| e.value().capabilities())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepDefinition;

    fn def(capability: &str) -> WorkflowDefinition {
        WorkflowDefinition::new("welcome", "1", vec![StepDefinition::new("send", capability)])
    }

    #[test]
    fn test_register_and_get() {
        let registry = WorkflowDefinitionRegistry::new();
        let key = registry.register(def("email")).unwrap();
        assert_eq!(key.to_string(), "welcome@1");
        assert_eq!(registry.get(&key).unwrap().steps[0].capability, "email");
        assert_eq!(registry.capabilities().into_iter().collect::<Vec<_>>(), vec!["email"]);
    }

    #[test]
    fn test_definitions_are_immutable() {
        let registry = WorkflowDefinitionRegistry::new();
        registry.register(def("email")).unwrap();
        assert!(registry.register(def("email")).is_ok());

        let err = registry.register(def("sms")).unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidDefinition { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_definition() {
        let registry = WorkflowDefinitionRegistry::new();
        let err = registry.get(&DefinitionRef::new("nope", "1")).unwrap_err();
        assert!(matches!(err, OrchestrationError::DefinitionNotFound { .. }));
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let registry = WorkflowDefinitionRegistry::new();
        let empty = WorkflowDefinition::new("empty", "1", vec![]);
        assert!(registry.register(empty).is_err());
        assert!(registry.is_empty());
    }
}
