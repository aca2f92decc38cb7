//! Step request and result payloads exchanged with downstream capability services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::definition::DefinitionRef;

/// Deterministic key for one attempt of one step of one instance
///
/// Downstream services use it to deduplicate at-least-once deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(instance_id: Uuid, step_name: &str, attempt: u32) -> Self {
        Self(format!("{instance_id}/{step_name}/{attempt}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request for a downstream service to execute one step attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMessage {
    pub message_id: Uuid,
    pub instance_id: Uuid,
    pub definition: DefinitionRef,
    pub step_name: String,
    pub step_index: usize,
    pub capability: String,
    pub attempt: u32,
    pub payload: Value,
    /// Outputs of previously completed steps, keyed by step name
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub correlation_id: String,
    pub idempotency_key: IdempotencyKey,
    /// `address:port` of the endpoint chosen at dispatch time
    pub endpoint: String,
    pub timeout_ms: u64,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Success,
    Failure,
    Timeout,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Outcome reported for one step attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub instance_id: Uuid,
    pub step_name: String,
    pub attempt: u32,
    pub idempotency_key: IdempotencyKey,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub correlation_id: String,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(message: &StepMessage, payload: Value) -> Self {
        Self::from_message(message, StepOutcome::Success, payload, None)
    }

    pub fn failure(message: &StepMessage, error: impl Into<String>) -> Self {
        Self::from_message(message, StepOutcome::Failure, Value::Null, Some(error.into()))
    }

    pub fn timeout(message: &StepMessage) -> Self {
        Self::from_message(
            message,
            StepOutcome::Timeout,
            Value::Null,
            Some(format!("step timed out after {}ms", message.timeout_ms)),
        )
    }

    /// Result synthesized by the engine when a step timeout timer fires
    pub fn synthetic_timeout(
        instance_id: Uuid,
        step_name: &str,
        attempt: u32,
        correlation_id: &str,
        timeout_ms: u64,
    ) -> Self {
        Self {
            instance_id,
            step_name: step_name.to_string(),
            attempt,
            idempotency_key: IdempotencyKey::new(instance_id, step_name, attempt),
            outcome: StepOutcome::Timeout,
            payload: Value::Null,
            error: Some(format!("step timed out after {timeout_ms}ms")),
            correlation_id: correlation_id.to_string(),
            completed_at: Utc::now(),
        }
    }

    fn from_message(
        message: &StepMessage,
        outcome: StepOutcome,
        payload: Value,
        error: Option<String>,
    ) -> Self {
        Self {
            instance_id: message.instance_id,
            step_name: message.step_name.clone(),
            attempt: message.attempt,
            idempotency_key: message.idempotency_key.clone(),
            outcome,
            payload,
            error,
            correlation_id: message.correlation_id.clone(),
            completed_at: Utc::now(),
        }
    }

    pub fn error_detail(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("step {} reported {}", self.step_name, self.outcome))
    }
}
