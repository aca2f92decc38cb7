//! # Transport Envelope
//!
//! Every payload crossing the transport is wrapped in a [`TransportMessage`] carrying
//! its message id, topic, delivery count and publish time. Bodies are JSON.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{MessagingError, MessagingResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub message_id: Uuid,
    pub topic: String,
    pub body: serde_json::Value,
    /// Number of times this message has been handed to a consumer
    pub delivery_count: u32,
    pub published_at: DateTime<Utc>,
    /// Last handler error, set when the message was nacked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TransportMessage {
    pub fn new(topic: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            topic: topic.into(),
            body,
            delivery_count: 0,
            published_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn encode<T: Serialize>(topic: impl Into<String>, payload: &T) -> MessagingResult<Self> {
        let body = serde_json::to_value(payload)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;
        Ok(Self::new(topic, body))
    }

    /// Deserialize the body into a typed payload
    pub fn decode<T: DeserializeOwned>(&self) -> MessagingResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| MessagingError::message_deserialization(format!("{}: {e}", self.topic)))
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Validate a topic name before it is used for publish or subscribe
pub fn validate_topic(topic: &str) -> MessagingResult<()> {
    if topic.trim().is_empty() {
        return Err(MessagingError::invalid_topic(topic, "topic must not be empty"));
    }
    if topic.chars().any(char::is_whitespace) {
        return Err(MessagingError::invalid_topic(
            topic,
            "topic must not contain whitespace",
        ));
    }
    Ok(())
}
