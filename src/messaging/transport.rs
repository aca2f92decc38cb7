//! Transport and handler traits.
//!
//! Delivery is at-least-once: a handler that returns an error causes redelivery, and a
//! message that keeps failing ends up on the topic's dead-letter channel. Subscribers on
//! the same topic compete for messages.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::errors::{HandlerError, MessagingResult};
use super::message::TransportMessage;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery; `Ok` acknowledges it
    async fn handle(&self, message: &TransportMessage) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish a message; returns its id
    async fn publish(&self, topic: &str, message: TransportMessage) -> MessagingResult<Uuid>;

    /// Attach a competing consumer to `topic`
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription>;

    /// Messages that exhausted their deliveries on `topic`
    async fn dead_letters(&self, topic: &str) -> MessagingResult<Vec<TransportMessage>>;

    /// Total dead-lettered messages across topics
    async fn dead_letter_count(&self) -> u64;

    async fn health_check(&self) -> MessagingResult<()>;

    fn transport_name(&self) -> &'static str;
}

/// Serialize `payload` and publish it on `topic`
pub async fn publish_json<T: Serialize + Sync>(
    transport: &dyn MessageTransport,
    topic: &str,
    payload: &T,
) -> MessagingResult<Uuid> {
    let message = TransportMessage::encode(topic, payload)?;
    transport.publish(topic, message).await
}

/// Handle to a running consumer
///
/// Dropping the handle also stops the consumer once it is idle.
#[derive(Debug)]
pub struct Subscription {
    consumer_id: Uuid,
    topic: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn new(topic: String, shutdown: watch::Sender<bool>, handle: JoinHandle<()>) -> Self {
        Self {
            consumer_id: Uuid::new_v4(),
            topic,
            shutdown,
            handle,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop consuming after the in-flight delivery completes
    pub async fn unsubscribe(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            debug!(topic = %self.topic, error = %e, "Consumer task ended abnormally");
        }
    }
}
