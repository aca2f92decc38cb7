//! # Step Result Listener
//!
//! Subscribes to `<capability>.step.result` for every capability used by a registered
//! definition and feeds decoded [`StepResult`]s into the engine.
//!
//! Undecodable bodies are rejected straight to the dead-letter topic. Store and other
//! transient engine errors are nacked so the transport redelivers the result.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::engine::OrchestrationEngine;
use crate::constants::topics;
use crate::error::OrchestrationError;
use crate::messaging::{
    HandlerError, MessageHandler, MessageTransport, MessagingResult, Subscription,
    TransportMessage,
};
use crate::models::StepResult;

/// Transport handler for step results
pub struct StepResultHandler {
    engine: Arc<OrchestrationEngine>,
}

impl StepResultHandler {
    pub fn new(engine: Arc<OrchestrationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MessageHandler for StepResultHandler {
    async fn handle(&self, message: &TransportMessage) -> Result<(), HandlerError> {
        let result: StepResult = message
            .decode()
            .map_err(|e| HandlerError::reject(e.to_string()))?;

        debug!(
            instance_id = %result.instance_id,
            step = %result.step_name,
            attempt = result.attempt,
            outcome = %result.outcome,
            redelivery = message.is_redelivery(),
            "📥 Step result received"
        );

        match self.engine.on_step_result(result).await {
            Ok(_) => Ok(()),
            Err(e) if is_retryable(&e) => Err(HandlerError::retry(e.to_string())),
            Err(e) => Err(HandlerError::reject(e.to_string())),
        }
    }
}

fn is_retryable(err: &OrchestrationError) -> bool {
    err.is_transient() || matches!(err, OrchestrationError::Store(_))
}

/// Owns the result subscriptions
pub struct ResultListener {
    engine: Arc<OrchestrationEngine>,
    transport: Arc<dyn MessageTransport>,
    consumers_per_topic: usize,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ResultListener {
    pub fn new(
        engine: Arc<OrchestrationEngine>,
        transport: Arc<dyn MessageTransport>,
        consumers_per_topic: usize,
    ) -> Self {
        Self {
            engine,
            transport,
            consumers_per_topic: consumers_per_topic.max(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the result topic of every capability in use
    ///
    /// Capabilities already subscribed are skipped, so this may be called again after
    /// registering new definitions.
    pub async fn start(&self) -> MessagingResult<usize> {
        let mut subscriptions = self.subscriptions.lock().await;
        let handler: Arc<dyn MessageHandler> = Arc::new(StepResultHandler::new(self.engine.clone()));
        let mut added = 0;

        for capability in self.engine.definitions().capabilities() {
            let topic = topics::step_result(&capability);
            if subscriptions.iter().any(|s| s.topic() == topic) {
                continue;
            }
            for _ in 0..self.consumers_per_topic {
                subscriptions.push(self.transport.subscribe(&topic, handler.clone()).await?);
            }
            added += 1;
            debug!(topic = %topic, consumers = self.consumers_per_topic, "Subscribed to step results");
        }

        info!(
            topics = added,
            total_consumers = subscriptions.len(),
            "📥 Result listener started"
        );
        Ok(added)
    }

    pub async fn topics(&self) -> Vec<String> {
        let subscriptions = self.subscriptions.lock().await;
        let mut topics: Vec<String> = subscriptions.iter().map(|s| s.topic().to_string()).collect();
        topics.dedup();
        topics
    }

    pub async fn shutdown(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().await.drain(..).collect();
        let count = subscriptions.len();
        for subscription in subscriptions.iter().filter(|s| !s.is_active()) {
            warn!(topic = %subscription.topic(), "Result consumer already stopped");
        }
        join_all(subscriptions.into_iter().map(Subscription::unsubscribe)).await;
        info!(consumers = count, "Result listener stopped");
    }
}
