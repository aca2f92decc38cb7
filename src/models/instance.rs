//! # Workflow Instances
//!
//! One execution of a [`WorkflowDefinition`](super::definition::WorkflowDefinition).
//! Every mutation happens on an owned copy which is then saved through the state
//! store's compare-and-swap on `version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::definition::DefinitionRef;
use super::messages::{IdempotencyKey, StepResult};
use crate::state_machine::{
    determine_target_state, StateMachineResult, TransitionRecord, WorkflowEvent, WorkflowStatus,
};

/// The attempt currently awaiting a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingAttempt {
    pub step_name: String,
    pub step_index: usize,
    pub attempt: u32,
    pub idempotency_key: IdempotencyKey,
    pub endpoint: String,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: Uuid,
    pub definition: DefinitionRef,
    pub status: WorkflowStatus,
    pub current_step: usize,
    /// Dispatched attempts per step name
    #[serde(default)]
    pub attempts: BTreeMap<String, u32>,
    /// Consecutive registry resolution failures for the current step
    #[serde(default)]
    pub registry_failures: u32,
    #[serde(default)]
    pub outstanding: Option<OutstandingAttempt>,
    pub correlation_id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub step_outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
    /// Store version; 0 means never persisted
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(definition: DefinitionRef, payload: Value, correlation_id: Option<String>) -> Self {
        let now = Utc::now();
        let instance_id = Uuid::new_v4();
        Self {
            instance_id,
            definition,
            status: WorkflowStatus::Pending,
            current_step: 0,
            attempts: BTreeMap::new(),
            registry_failures: 0,
            outstanding: None,
            correlation_id: correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            payload,
            step_outputs: BTreeMap::new(),
            last_error: None,
            transitions: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an event, recording the transition
    pub fn apply(&mut self, event: WorkflowEvent) -> StateMachineResult<WorkflowStatus> {
        let target = determine_target_state(self.status, &event)?;
        let now = Utc::now();

        if let Some(message) = event.error_message() {
            self.last_error = Some(message.to_string());
        }

        self.transitions.push(TransitionRecord {
            from: self.status,
            to: target,
            event: event.event_type().to_string(),
            detail: event.detail().map(str::to_string),
            at: now,
        });
        self.status = target;
        self.updated_at = now;

        if target.is_terminal() {
            self.outstanding = None;
        }

        Ok(target)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn attempts_for(&self, step_name: &str) -> u32 {
        self.attempts.get(step_name).copied().unwrap_or(0)
    }

    /// Attempt number the next dispatch of `step_name` will carry
    pub fn next_attempt(&self, step_name: &str) -> u32 {
        self.attempts_for(step_name) + 1
    }

    /// Record a dispatched attempt as outstanding
    pub fn record_dispatch(
        &mut self,
        step_name: &str,
        step_index: usize,
        attempt: u32,
        endpoint: String,
    ) -> IdempotencyKey {
        let key = IdempotencyKey::new(self.instance_id, step_name, attempt);
        self.attempts.insert(step_name.to_string(), attempt);
        self.registry_failures = 0;
        self.outstanding = Some(OutstandingAttempt {
            step_name: step_name.to_string(),
            step_index,
            attempt,
            idempotency_key: key.clone(),
            endpoint,
            dispatched_at: Utc::now(),
        });
        key
    }

    /// Whether `result` answers the attempt currently awaited
    pub fn is_outstanding(&self, result: &StepResult) -> bool {
        self.outstanding
            .as_ref()
            .map(|o| o.step_name == result.step_name && o.attempt == result.attempt)
            .unwrap_or(false)
    }

    /// Record a step output and move the step pointer forward
    pub fn advance(&mut self, step_name: &str, output: Value) {
        self.step_outputs.insert(step_name.to_string(), output);
        self.current_step += 1;
        self.outstanding = None;
        self.updated_at = Utc::now();
    }

    /// Pass over the current step without dispatching it
    pub fn skip(&mut self, step_name: &str) -> StateMachineResult<()> {
        self.apply(WorkflowEvent::SkipStep(step_name.to_string()))?;
        self.step_outputs
            .insert(step_name.to_string(), serde_json::json!({ "skipped": true }));
        self.current_step += 1;
        Ok(())
    }

    /// Instance is in a status from which the engine should dispatch the current step
    pub fn needs_dispatch(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::Pending | WorkflowStatus::Retrying
        ) || (self.status == WorkflowStatus::Running && self.outstanding.is_none())
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::messages::StepOutcome;
    use serde_json::json;

    fn instance() -> WorkflowInstance {
        WorkflowInstance::new(DefinitionRef::new("signup", "1"), json!({}), None)
    }

    fn result_for(instance: &WorkflowInstance, step: &str, attempt: u32) -> StepResult {
        StepResult {
            instance_id: instance.instance_id,
            step_name: step.to_string(),
            attempt,
            idempotency_key: IdempotencyKey::new(instance.instance_id, step, attempt),
            outcome: StepOutcome::Success,
            payload: json!(null),
            error: None,
            correlation_id: instance.correlation_id.clone(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_instance_defaults() {
        let inst = instance();
        assert_eq!(inst.status, WorkflowStatus::Pending);
        assert_eq!(inst.version, 0);
        assert!(inst.needs_dispatch());
        assert!(!inst.correlation_id.is_empty());
    }

    #[test]
    fn test_apply_records_transition_history() {
        let mut inst = instance();
        inst.apply(WorkflowEvent::Dispatch).unwrap();
        inst.apply(WorkflowEvent::step_failed_with_error("smtp down"))
            .unwrap();

        assert_eq!(inst.status, WorkflowStatus::StepFailed);
        assert_eq!(inst.last_error.as_deref(), Some("smtp down"));
        assert_eq!(inst.transitions.len(), 2);
        assert_eq!(inst.transitions[1].from, WorkflowStatus::Running);
        assert_eq!(inst.transitions[1].event, "step_failed");
    }

    #[test]
    fn test_rejected_event_leaves_instance_untouched() {
        let mut inst = instance();
        assert!(inst.apply(WorkflowEvent::Complete).is_err());
        assert_eq!(inst.status, WorkflowStatus::Pending);
        assert!(inst.transitions.is_empty());
    }

    #[test]
    fn test_outstanding_matching() {
        let mut inst = instance();
        let key = inst.record_dispatch("create_account", 0, 1, "127.0.0.1:80".to_string());
        assert_eq!(key.as_str(), format!("{}/create_account/1", inst.instance_id));
        assert_eq!(inst.attempts_for("create_account"), 1);
        assert_eq!(inst.next_attempt("create_account"), 2);

        assert!(inst.is_outstanding(&result_for(&inst, "create_account", 1)));
        assert!(!inst.is_outstanding(&result_for(&inst, "create_account", 2)));
        assert!(!inst.is_outstanding(&result_for(&inst, "other", 1)));

        inst.advance("create_account", json!({"id": 7}));
        assert_eq!(inst.current_step, 1);
        assert!(inst.outstanding.is_none());
        assert!(!inst.is_outstanding(&result_for(&inst, "create_account", 1)));
    }

    #[test]
    fn test_terminal_clears_outstanding() {
        let mut inst = instance();
        inst.record_dispatch("a", 0, 1, "h:1".to_string());
        inst.apply(WorkflowEvent::Dispatch).unwrap();
        inst.apply(WorkflowEvent::Cancel).unwrap();
        assert!(inst.outstanding.is_none());
        assert!(inst.is_terminal());
    }

    #[test]
    fn test_skip_records_output_and_moves_pointer() {
        let mut inst = instance();
        inst.skip("send_sms").unwrap();

        assert_eq!(inst.status, WorkflowStatus::Pending);
        assert_eq!(inst.current_step, 1);
        assert_eq!(inst.step_outputs["send_sms"], json!({"skipped": true}));
        assert_eq!(inst.attempts_for("send_sms"), 0);
        let record = inst.transitions.last().unwrap();
        assert_eq!(record.event, "skip_step");
        assert_eq!(record.detail.as_deref(), Some("send_sms"));
        assert!(inst.last_error.is_none());
    }
}
