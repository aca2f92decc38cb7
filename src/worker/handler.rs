//! Step handler contract for capability workers.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;

use crate::models::StepMessage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepHandlerError {
    /// The step ran and failed; reported as a FAILURE outcome
    #[error("Step failed: {0}")]
    Failed(String),

    /// The handler gave up waiting on its own dependency; reported as TIMEOUT
    #[error("Step timed out: {0}")]
    TimedOut(String),
}

impl StepHandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::TimedOut(message.into())
    }
}

/// Executes one step attempt for a capability
///
/// Handlers see every delivery of a request, including redeliveries, and may use
/// `message.idempotency_key` to make side effects safe to repeat.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn invoke(&self, message: &StepMessage) -> Result<Value, StepHandlerError>;
}

/// Adapter turning an async closure into a [`StepHandler`]
pub struct FnStepHandler<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStepHandler<F, Fut>
where
    F: Fn(StepMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepHandlerError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> StepHandler for FnStepHandler<F, Fut>
where
    F: Fn(StepMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepHandlerError>> + Send,
{
    async fn invoke(&self, message: &StepMessage) -> Result<Value, StepHandlerError> {
        (self.func)(message.clone()).await
    }
}
