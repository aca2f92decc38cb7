use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orquestador::models::StepMessage;
use orquestador::worker::{StepHandler, StepHandlerError};

/// How a [`ScriptedHandler`] answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    /// Fail attempts `1..=n`, succeed afterwards
    FailTimes(u32),
    AlwaysFail,
    /// Sleep this long before succeeding
    Slow(Duration),
}

/// Step handler with a fixed script that records every invocation
pub struct ScriptedHandler {
    script: Script,
    invocations: AtomicU32,
    seen: Mutex<Vec<StepMessage>>,
}

impl ScriptedHandler {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            invocations: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn succeed() -> Arc<Self> {
        Self::new(Script::Succeed)
    }

    pub fn fail_times(n: u32) -> Arc<Self> {
        Self::new(Script::FailTimes(n))
    }

    pub fn always_fail() -> Arc<Self> {
        Self::new(Script::AlwaysFail)
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<StepMessage> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl StepHandler for ScriptedHandler {
    async fn invoke(&self, message: &StepMessage) -> Result<Value, StepHandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(message.clone());

        let output = json!({
            "step": message.step_name,
            "attempt": message.attempt,
            "endpoint": message.endpoint,
        });

        match self.script {
            Script::Succeed => Ok(output),
            Script::FailTimes(n) if message.attempt <= n => Err(StepHandlerError::failed(
                format!("scripted failure on attempt {}", message.attempt),
            )),
            Script::FailTimes(_) => Ok(output),
            Script::AlwaysFail => Err(StepHandlerError::failed("scripted permanent failure")),
            Script::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
        }
    }
}
