//! # Event Triggers
//!
//! Routes inbound domain events to workflow definitions. Events arrive on the trigger
//! topic as `{"type": ..., "data": {...}, "meta": {...}}`; the event type selects a
//! definition and the whole event becomes the new instance's payload. A string
//! `meta.correlation_id` is propagated to the instance.
//!
//! Unrouted event types are logged and acknowledged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::engine::OrchestrationEngine;
use crate::config::TriggersConfig;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::messaging::{HandlerError, MessageHandler, TransportMessage};
use crate::models::DefinitionRef;
use crate::registry::WorkflowDefinitionRegistry;

/// Inbound domain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type", alias = "event_type", alias = "routing_key")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl TriggerEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn correlation_id(&self) -> Option<String> {
        self.meta
            .get("correlation_id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Event type to definition routing table
#[derive(Debug, Clone, Default)]
pub struct TriggerRouter {
    routes: HashMap<String, DefinitionRef>,
}

impl TriggerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TriggersConfig) -> OrchestrationResult<Self> {
        let mut router = Self::new();
        for route in &config.routes {
            let definition = DefinitionRef::from_str(&route.definition)
                .map_err(|reason| OrchestrationError::invalid_definition(&route.definition, reason))?;
            router.add_route(&route.event_type, definition);
        }
        Ok(router)
    }

    pub fn add_route(&mut self, event_type: impl Into<String>, definition: DefinitionRef) {
        self.routes.insert(event_type.into(), definition);
    }

    pub fn route(&self, event_type: &str) -> Option<&DefinitionRef> {
        self.routes.get(event_type)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Every route must point at a registered definition
    pub fn validate(&self, definitions: &WorkflowDefinitionRegistry) -> OrchestrationResult<()> {
        for (event_type, definition) in &self.routes {
            if !definitions.contains(definition) {
                error!(event_type = %event_type, definition = %definition, "Trigger route targets unknown definition");
                return Err(OrchestrationError::definition_not_found(definition.to_string()));
            }
        }
        Ok(())
    }
}

/// Transport handler starting workflows from trigger events
pub struct TriggerHandler {
    router: TriggerRouter,
    engine: Arc<OrchestrationEngine>,
}

impl TriggerHandler {
    pub fn new(router: TriggerRouter, engine: Arc<OrchestrationEngine>) -> Self {
        Self { router, engine }
    }

    /// Start the workflow routed for `event`, if any
    pub async fn dispatch(&self, event: TriggerEvent) -> OrchestrationResult<Option<Uuid>> {
        let Some(definition) = self.router.route(&event.event_type) else {
            warn!(event_type = %event.event_type, "Unhandled trigger event");
            return Ok(None);
        };

        let correlation_id = event.correlation_id();
        let payload = serde_json::to_value(&event)?;
        let instance_id = self
            .engine
            .start_with_correlation(definition, payload, correlation_id)
            .await?;

        info!(
            event_type = %event.event_type,
            definition = %definition,
            instance_id = %instance_id,
            "🚀 Workflow started from trigger event"
        );
        Ok(Some(instance_id))
    }
}

#[async_trait]
impl MessageHandler for TriggerHandler {
    async fn handle(&self, message: &TransportMessage) -> Result<(), HandlerError> {
        let event: TriggerEvent = message
            .decode()
            .map_err(|e| HandlerError::reject(e.to_string()))?;
        debug!(event_type = %event.event_type, message_id = %message.message_id, "Trigger event received");

        match self.dispatch(event).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() || matches!(e, OrchestrationError::Store(_)) => {
                Err(HandlerError::retry(e.to_string()))
            }
            Err(e) => {
                error!(error = %e, "Trigger event could not start a workflow");
                Err(HandlerError::reject(e.to_string()))
            }
        }
    }
}
