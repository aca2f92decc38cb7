//! # In-Memory Message Transport
//!
//! In-process broker for tests and single-node deployments.
//!
//! - **Competing consumers**: every subscriber on a topic pulls from the same queue
//! - **Redelivery**: a nacked message is requeued after `redelivery_delay`
//! - **Dead letters**: after `max_deliveries` attempts, or on reject, the message is
//!   moved to `<topic>.dead_letter`

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::errors::{HandlerError, MessagingError, MessagingResult};
use super::message::{validate_topic, TransportMessage};
use super::transport::{MessageHandler, MessageTransport, Subscription};
use crate::config::TransportConfig;
use crate::constants::topics;

/// Per-topic counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
    pub depth: usize,
    pub consumers: usize,
}

#[derive(Debug, Default)]
struct TopicQueue {
    messages: Mutex<VecDeque<TransportMessage>>,
    dead_letters: Mutex<Vec<TransportMessage>>,
    notify: Notify,
    consumers: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    dead_lettered: AtomicU64,
}

impl TopicQueue {
    fn push(&self, message: TransportMessage) {
        self.messages.lock().push_back(message);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<TransportMessage> {
        self.messages.lock().pop_front()
    }
}

#[derive(Debug)]
struct BrokerInner {
    topics: DashMap<String, Arc<TopicQueue>>,
    redelivery_delay: Duration,
    max_deliveries: u32,
    closed: AtomicBool,
}

impl BrokerInner {
    fn topic(&self, name: &str) -> Arc<TopicQueue> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicQueue::default()))
            .clone()
    }

    fn dead_letter(&self, queue: &TopicQueue, mut message: TransportMessage, reason: &str) {
        error!(
            topic = %message.topic,
            message_id = %message.message_id,
            deliveries = message.delivery_count,
            reason = %reason,
            "☠️ Message moved to dead-letter channel"
        );
        message.last_error = Some(reason.to_string());
        queue.dead_lettered.fetch_add(1, Ordering::Relaxed);
        queue.dead_letters.lock().push(message);
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    inner: Arc<BrokerInner>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl InMemoryTransport {
    pub fn new(redelivery_delay: Duration, max_deliveries: u32) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                redelivery_delay,
                max_deliveries: max_deliveries.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.redelivery_delay(), config.max_deliveries)
    }

    /// Stop accepting publishes; running consumers drain what is queued
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of messages waiting on a topic (for testing)
    pub fn queue_length(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|q| q.messages.lock().len())
            .unwrap_or(0)
    }

    pub fn stats(&self, topic: &str) -> TopicStats {
        self.inner
            .topics
            .get(topic)
            .map(|q| TopicStats {
                published: q.published.load(Ordering::Relaxed),
                delivered: q.delivered.load(Ordering::Relaxed),
                acked: q.acked.load(Ordering::Relaxed),
                nacked: q.nacked.load(Ordering::Relaxed),
                dead_lettered: q.dead_lettered.load(Ordering::Relaxed),
                depth: q.messages.lock().len(),
                consumers: q.consumers.load(Ordering::Relaxed) as usize,
            })
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

async fn consume(
    inner: Arc<BrokerInner>,
    queue: Arc<TopicQueue>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(mut message) = queue.pop() else {
            tokio::select! {
                _ = queue.notify.notified() => {}
                _ = shutdown.changed() => break,
            }
            continue;
        };

        message.delivery_count += 1;
        queue.delivered.fetch_add(1, Ordering::Relaxed);

        match handler.handle(&message).await {
            Ok(()) => {
                queue.acked.fetch_add(1, Ordering::Relaxed);
            }
            Err(HandlerError::Reject(reason)) => {
                queue.nacked.fetch_add(1, Ordering::Relaxed);
                inner.dead_letter(&queue, message, &reason);
            }
            Err(HandlerError::Retry(reason)) => {
                queue.nacked.fetch_add(1, Ordering::Relaxed);
                if message.delivery_count >= inner.max_deliveries {
                    inner.dead_letter(&queue, message, &reason);
                    continue;
                }

                warn!(
                    topic = %message.topic,
                    message_id = %message.message_id,
                    delivery = message.delivery_count,
                    error = %reason,
                    "Handler nacked message, scheduling redelivery"
                );
                message.last_error = Some(reason);

                let delay = inner.redelivery_delay;
                let requeue = queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    requeue.push(message);
                });
            }
        }
    }

    queue.consumers.fetch_sub(1, Ordering::Relaxed);
    // Pass any pending wakeup on to a sibling consumer
    queue.notify.notify_one();
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, mut message: TransportMessage) -> MessagingResult<Uuid> {
        validate_topic(topic)?;
        if self.is_closed() {
            return Err(MessagingError::Closed);
        }

        message.topic = topic.to_string();
        message.delivery_count = 0;
        message.published_at = Utc::now();
        let id = message.message_id;

        let queue = self.inner.topic(topic);
        queue.published.fetch_add(1, Ordering::Relaxed);
        queue.push(message);

        debug!(topic = %topic, message_id = %id, "📤 Published message");
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription> {
        validate_topic(topic)?;
        if self.is_closed() {
            return Err(MessagingError::subscribe(topic, "transport is closed"));
        }

        let queue = self.inner.topic(topic);
        queue.consumers.fetch_add(1, Ordering::Relaxed);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(consume(
            self.inner.clone(),
            queue,
            handler,
            shutdown_rx,
        ));

        debug!(topic = %topic, "📥 Consumer subscribed");
        Ok(Subscription::new(topic.to_string(), shutdown_tx, handle))
    }

    async fn dead_letters(&self, topic: &str) -> MessagingResult<Vec<TransportMessage>> {
        let source = topic
            .strip_suffix(&format!(".{}", topics::DEAD_LETTER_SUFFIX))
            .unwrap_or(topic);
        Ok(self
            .inner
            .topics
            .get(source)
            .map(|q| q.dead_letters.lock().clone())
            .unwrap_or_default())
    }

    async fn dead_letter_count(&self) -> u64 {
        self.inner
            .topics
            .iter()
            .map(|q| q.dead_lettered.load(Ordering::Relaxed))
            .sum()
    }

    async fn health_check(&self) -> MessagingResult<()> {
        if self.is_closed() {
            Err(MessagingError::Closed)
        } else {
            Ok(())
        }
    }

    fn transport_name(&self) -> &'static str {
        "in_memory"
    }
}
