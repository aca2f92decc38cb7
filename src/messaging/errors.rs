//! # Messaging Error Types
//!
//! Structured errors for the message transport, plus the [`HandlerError`] a consumer
//! returns to nack a delivery.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Publish failed on topic {topic}: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscribe failed on topic {topic}: {message}")]
    Subscribe { topic: String, message: String },

    #[error("Invalid topic name: {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Transport is closed")]
    Closed,

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn subscribe(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn invalid_topic(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Returned by a message handler to negative-acknowledge a delivery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Transient failure; the message is redelivered until the delivery limit
    #[error("retryable handler failure: {0}")]
    Retry(String),

    /// The message can never be processed; it goes straight to the dead-letter channel
    #[error("message rejected: {0}")]
    Reject(String),
}

impl HandlerError {
    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retry(message.into())
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self::Reject(message.into())
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject(_))
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
