#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orquestador
//!
//! Distributed task-orchestration core.
//!
//! ## Overview
//!
//! Orquestador accepts orchestration requests, dispatches each workflow step to a
//! downstream service over asynchronous messaging, tracks progress through a workflow
//! state machine and applies retry, backoff and idempotency guarantees under
//! at-least-once delivery. Services are located through a dynamic registry keyed by
//! capability name.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Engine, retry supervisor, timers, listeners and bootstrap
//! - [`state_machine`] - Workflow statuses, events and the transition table
//! - [`models`] - Definitions, instances, step messages and results
//! - [`store`] - Versioned state store (in-memory and PostgreSQL)
//! - [`messaging`] - Transport with ack, redelivery and dead-lettering
//! - [`registry`] - Capability resolution and workflow definitions
//! - [`worker`] - Capability workers executing dispatched steps
//! - [`admin`] - Health, status and counters
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orquestador::config::ConfigManager;
//! use orquestador::models::DefinitionRef;
//! use orquestador::orchestration::{BootstrapOptions, OrchestrationBootstrap};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let system = OrchestrationBootstrap::bootstrap(config, BootstrapOptions::standalone()).await?;
//!
//! let instance_id = system
//!     .start(&DefinitionRef::new("welcome", "1"), serde_json::json!({"user_id": 42}))
//!     .await?;
//! println!("status: {}", system.status(instance_id).await?.status);
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod worker;

pub use config::{ConfigManager, OrquestadorConfig};
pub use error::{OrchestrationError, OrchestrationResult};
pub use models::{
    DefinitionRef, StepDefinition, StepMessage, StepOutcome, StepResult, WorkflowDefinition,
    WorkflowInstance,
};
pub use orchestration::{
    BootstrapOptions, OrchestrationBootstrap, OrchestrationEngine, OrchestrationSystem,
    ResultDisposition,
};
pub use state_machine::{WorkflowEvent, WorkflowStatus};
