//! # Workers
//!
//! Downstream services executing dispatched steps, looked up by capability.

pub mod capability_worker;
pub mod handler;

pub use capability_worker::{CapabilityRegistry, CapabilityWorker};
pub use handler::{FnStepHandler, StepHandler, StepHandlerError};
