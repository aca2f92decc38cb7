//! # Capability Worker
//!
//! The downstream half of the dispatch contract. A worker owns a lookup table from
//! capability name to [`StepHandler`], consumes `<capability>.step.request` and
//! publishes a [`StepResult`] to `<capability>.step.result`.
//!
//! Results are remembered by idempotency key, so a redelivered request republishes
//! the original result instead of invoking the handler again. Entries expire after
//! the retention window, which should exceed the transport's redelivery horizon.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::handler::{StepHandler, StepHandlerError};
use crate::constants::{topics, DEFAULT_WORKER_RESULT_RETENTION_MS};
use crate::messaging::{
    publish_json, HandlerError, MessageHandler, MessageTransport, MessagingResult, Subscription,
    TransportMessage,
};
use crate::models::{StepMessage, StepResult};

/// Capability name to handler lookup table
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(capability.into(), handler);
    }

    pub fn with_handler(mut self, capability: impl Into<String>, handler: Arc<dyn StepHandler>) -> Self {
        self.register(capability, handler);
        self
    }

    pub fn get(&self, capability: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(capability).cloned()
    }

    pub fn capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Results of served attempts keyed by idempotency key
struct ResultCache {
    entries: DashMap<String, (StepResult, Instant)>,
    retention: Duration,
    last_prune: parking_lot::Mutex<Instant>,
}

impl ResultCache {
    fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
            last_prune: parking_lot::Mutex::new(Instant::now()),
        }
    }

    fn get(&self, key: &str) -> Option<StepResult> {
        self.entries
            .get(key)
            .filter(|entry| entry.value().1.elapsed() < self.retention)
            .map(|entry| entry.value().0.clone())
    }

    fn insert(&self, key: String, result: StepResult) {
        self.entries.insert(key, (result, Instant::now()));

        // At most one sweep per quarter of the retention window
        let due = {
            let mut last = self.last_prune.lock();
            if last.elapsed() >= self.retention / 4 {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            self.prune();
        }
    }

    fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, recorded_at)| recorded_at.elapsed() < self.retention);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Expired cached step results");
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct RequestHandler {
    capability: String,
    handler: Arc<dyn StepHandler>,
    transport: Arc<dyn MessageTransport>,
    completed: Arc<ResultCache>,
    executed: Arc<AtomicUsize>,
    enforce_timeout: bool,
}

impl RequestHandler {
    async fn execute(&self, message: &StepMessage) -> StepResult {
        let outcome = if self.enforce_timeout && message.timeout_ms > 0 {
            match tokio::time::timeout(
                Duration::from_millis(message.timeout_ms),
                self.handler.invoke(message),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => return StepResult::timeout(message),
            }
        } else {
            self.handler.invoke(message).await
        };

        match outcome {
            Ok(payload) => StepResult::success(message, payload),
            Err(StepHandlerError::Failed(error)) => StepResult::failure(message, error),
            Err(StepHandlerError::TimedOut(_)) => StepResult::timeout(message),
        }
    }
}

#[async_trait]
impl MessageHandler for RequestHandler {
    async fn handle(&self, envelope: &TransportMessage) -> Result<(), HandlerError> {
        let message: StepMessage = envelope
            .decode()
            .map_err(|e| HandlerError::reject(e.to_string()))?;

        let key = message.idempotency_key.as_str().to_string();
        let result = match self.completed.get(&key) {
            Some(previous) => {
                debug!(
                    capability = %self.capability,
                    idempotency_key = %key,
                    "Redelivered step request, republishing previous result"
                );
                previous
            }
            None => {
                let result = self.execute(&message).await;
                self.executed.fetch_add(1, Ordering::Relaxed);
                self.completed.insert(key, result.clone());
                result
            }
        };

        let topic = topics::step_result(&self.capability);
        publish_json(self.transport.as_ref(), &topic, &result)
            .await
            .map_err(|e| HandlerError::retry(e.to_string()))?;

        debug!(
            capability = %self.capability,
            instance_id = %result.instance_id,
            step = %result.step_name,
            attempt = result.attempt,
            outcome = %result.outcome,
            "📤 Step result published"
        );
        Ok(())
    }
}

/// Serves step requests for a set of capabilities
pub struct CapabilityWorker {
    transport: Arc<dyn MessageTransport>,
    registry: CapabilityRegistry,
    completed: Arc<ResultCache>,
    executed: Arc<AtomicUsize>,
    enforce_timeout: bool,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl CapabilityWorker {
    pub fn new(transport: Arc<dyn MessageTransport>, registry: CapabilityRegistry) -> Self {
        Self {
            transport,
            registry,
            completed: Arc::new(ResultCache::new(Duration::from_millis(
                DEFAULT_WORKER_RESULT_RETENTION_MS,
            ))),
            executed: Arc::new(AtomicUsize::new(0)),
            enforce_timeout: true,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Leave timing out to the orchestrator instead of cutting handlers off locally
    pub fn without_local_timeout(mut self) -> Self {
        self.enforce_timeout = false;
        self
    }

    /// How long served results are kept for redelivered requests
    ///
    /// Call before [`start`](Self::start); results cached so far are dropped.
    pub fn with_result_retention(mut self, retention: Duration) -> Self {
        self.completed = Arc::new(ResultCache::new(retention));
        self
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.registry.capabilities()
    }

    /// Number of distinct attempts executed so far
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    /// Results currently held for redelivered requests
    pub fn cached_results(&self) -> usize {
        self.completed.len()
    }

    /// Drop cached results older than the retention window
    pub fn prune_expired(&self) -> usize {
        self.completed.prune()
    }

    pub async fn start(&self) -> MessagingResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.is_empty() {
            warn!("Capability worker already started");
            return Ok(());
        }

        for capability in self.registry.capabilities() {
            let Some(handler) = self.registry.get(&capability) else {
                continue;
            };
            let request_handler = Arc::new(RequestHandler {
                capability: capability.clone(),
                handler,
                transport: self.transport.clone(),
                completed: self.completed.clone(),
                executed: self.executed.clone(),
                enforce_timeout: self.enforce_timeout,
            });
            let topic = topics::step_request(&capability);
            subscriptions.push(self.transport.subscribe(&topic, request_handler).await?);
        }

        info!(
            capabilities = ?self.registry.capabilities(),
            "🔧 Capability worker started"
        );
        Ok(())
    }

    pub async fn shutdown(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().await.drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe().await;
        }
        info!("Capability worker stopped");
    }
}
