//! # Messaging
//!
//! Durable publish/subscribe with acknowledgment, redelivery and dead-lettering.
//! [`MessageTransport`] is the seam for a broker-backed implementation;
//! [`InMemoryTransport`] is the in-process default.

pub mod errors;
pub mod in_memory;
pub mod message;
pub mod transport;

pub use errors::{HandlerError, MessagingError, MessagingResult};
pub use in_memory::{InMemoryTransport, TopicStats};
pub use message::{validate_topic, TransportMessage};
pub use transport::{publish_json, MessageHandler, MessageTransport, Subscription};
