//! # Orchestration
//!
//! ## Core Components
//!
//! - **OrchestrationEngine**: advances workflow instances, dispatches steps and applies
//!   results under compare-and-swap
//! - **RetrySupervisor**: retry-or-fail decisions and backoff delays
//! - **TimerService**: cancellable re-dispatch and step timeout timers
//! - **ResultListener**: consumes `<capability>.step.result` into the engine
//! - **TriggerRouter**: starts workflows from inbound domain events
//! - **OrchestrationBootstrap**: builds and tears down a complete system

pub mod bootstrap;
pub mod engine;
pub mod result_listener;
pub mod supervisor;
pub mod timers;
pub mod triggers;
pub mod types;

pub use bootstrap::{BootstrapOptions, OrchestrationBootstrap, OrchestrationSystem, SystemStatus};
pub use engine::{EngineComponents, OrchestrationEngine};
pub use result_listener::{ResultListener, StepResultHandler};
pub use supervisor::{RetryDecision, RetrySupervisor};
pub use timers::{TimerEvent, TimerKind, TimerService};
pub use triggers::{TriggerEvent, TriggerHandler, TriggerRouter};
pub use types::{DiscardReason, ResultDisposition};
