//! # Orchestration Engine
//!
//! Drives workflow instances through their step sequence.
//!
//! Every state change is an optimistic update: load the instance, mutate an owned copy,
//! save it with a version check. A version conflict means someone else moved the
//! instance, so the engine reloads and re-evaluates the same input against the newer
//! state, up to `max_cas_retries` times. No lock is held across registry lookups or
//! transport publishes.
//!
//! ## Result handling
//!
//! A [`StepResult`] is accepted only while its (step, attempt) is the outstanding
//! attempt of a `RUNNING` instance. Anything else is discarded: unknown instances,
//! terminal instances and duplicates (late, replayed or already-superseded attempts).
//!
//! ## Timers
//!
//! Each dispatch arms a step timeout; a failed attempt arms a re-dispatch after the
//! supervisor's backoff. Timer events are checked against current state before they
//! act, so a timer that raced with a result is harmless.
//!
//! A dispatch that fails on a store error after the preceding transition was
//! committed is handed to a re-dispatch timer, so the instance never waits on a
//! result that was never requested.
//!
//! ## Conditional steps
//!
//! A step with `skip_unless` is passed over when its payload condition does not hold;
//! skipping the last remaining step completes the instance.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::supervisor::{RetryDecision, RetrySupervisor};
use super::timers::{TimerEvent, TimerKind, TimerService};
use super::types::{DiscardReason, ResultDisposition};
use crate::admin::metrics::OrchestrationMetrics;
use crate::config::EngineConfig;
use crate::constants::topics;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::{log_step_operation, log_workflow_operation};
use crate::messaging::{publish_json, MessageTransport};
use crate::models::{
    DefinitionRef, StepDefinition, StepMessage, StepOutcome, StepResult, WorkflowDefinition,
    WorkflowInstance,
};
use crate::registry::{RegistryClient, RegistryError, WorkflowDefinitionRegistry};
use crate::state_machine::{WorkflowEvent, WorkflowStatus};
use crate::store::WorkflowStateStore;

/// Collaborators the engine is built from
pub struct EngineComponents {
    pub definitions: Arc<WorkflowDefinitionRegistry>,
    pub store: Arc<dyn WorkflowStateStore>,
    pub transport: Arc<dyn MessageTransport>,
    pub registry: RegistryClient,
    pub supervisor: RetrySupervisor,
    pub timers: TimerService,
    pub metrics: Arc<OrchestrationMetrics>,
    pub config: EngineConfig,
}

pub struct OrchestrationEngine {
    definitions: Arc<WorkflowDefinitionRegistry>,
    store: Arc<dyn WorkflowStateStore>,
    transport: Arc<dyn MessageTransport>,
    registry: RegistryClient,
    supervisor: RetrySupervisor,
    timers: TimerService,
    metrics: Arc<OrchestrationMetrics>,
    config: EngineConfig,
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("store", &self.store.backend_name())
            .field("transport", &self.transport.transport_name())
            .field("definitions", &self.definitions.len())
            .field("pending_timers", &self.timers.pending())
            .finish()
    }
}

impl OrchestrationEngine {
    pub fn new(components: EngineComponents) -> Self {
        Self {
            definitions: components.definitions,
            store: components.store,
            transport: components.transport,
            registry: components.registry,
            supervisor: components.supervisor,
            timers: components.timers,
            metrics: components.metrics,
            config: components.config,
        }
    }

    pub fn definitions(&self) -> &Arc<WorkflowDefinitionRegistry> {
        &self.definitions
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStateStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<OrchestrationMetrics> {
        &self.metrics
    }

    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// Start a new instance of `definition` and dispatch its first step
    pub async fn start(&self, definition: &DefinitionRef, payload: Value) -> OrchestrationResult<Uuid> {
        self.start_with_correlation(definition, payload, None).await
    }

    /// Start an instance, propagating a caller-provided correlation id
    #[instrument(skip(self, payload), fields(definition = %definition))]
    pub async fn start_with_correlation(
        &self,
        definition: &DefinitionRef,
        payload: Value,
        correlation_id: Option<String>,
    ) -> OrchestrationResult<Uuid> {
        // Unknown definitions never create an instance
        self.definitions.get(definition)?;

        let mut instance = WorkflowInstance::new(definition.clone(), payload, correlation_id);
        instance.version = self.store.save(&instance).await?;
        let instance_id = instance.instance_id;

        self.metrics.record_started();
        log_workflow_operation(
            "start",
            Some(instance_id),
            Some(&definition.to_string()),
            instance.status.as_str(),
            Some(&instance.correlation_id),
        );

        self.dispatch_step(instance).await?;
        Ok(instance_id)
    }

    /// Current persisted state of an instance
    pub async fn status(&self, instance_id: Uuid) -> OrchestrationResult<WorkflowInstance> {
        self.reload(instance_id).await
    }

    /// Cancel an instance; cancelling a terminal instance is a no-op
    #[instrument(skip(self))]
    pub async fn cancel(&self, instance_id: Uuid) -> OrchestrationResult<WorkflowStatus> {
        let instance = self.reload(instance_id).await?;
        let mut cancelled = false;

        let instance = self
            .commit(instance, |inst| {
                if inst.is_terminal() {
                    cancelled = false;
                    return Ok(false);
                }
                inst.apply(WorkflowEvent::Cancel)?;
                cancelled = true;
                Ok(true)
            })
            .await?;

        self.timers.cancel_all(instance_id);

        if cancelled {
            self.metrics.record_cancelled();
            log_workflow_operation(
                "cancel",
                Some(instance_id),
                Some(&instance.definition.to_string()),
                instance.status.as_str(),
                None,
            );
        } else {
            debug!(instance_id = %instance_id, status = %instance.status, "Cancel ignored for terminal instance");
        }

        Ok(instance.status)
    }

    /// Apply a step result reported by a downstream service
    #[instrument(skip(self, result), fields(instance_id = %result.instance_id, step = %result.step_name, attempt = result.attempt))]
    pub async fn on_step_result(&self, result: StepResult) -> OrchestrationResult<ResultDisposition> {
        let Some(instance) = self.store.load(result.instance_id).await? else {
            self.metrics.record_discarded();
            warn!(
                instance_id = %result.instance_id,
                step = %result.step_name,
                "📥 Discarding result for unknown instance"
            );
            return Ok(ResultDisposition::discarded(DiscardReason::UnknownInstance));
        };

        let definition = self.definitions.get(&instance.definition)?;
        let mut disposition = ResultDisposition::discarded(DiscardReason::Duplicate);

        let instance = self
            .commit(instance, |inst| {
                disposition = self.evaluate_result(inst, &definition, &result)?;
                Ok(!disposition.is_discarded())
            })
            .await?;

        self.after_result(&instance, &result, &disposition).await?;
        Ok(disposition)
    }

    /// Decide and apply the effect of `result` on `instance`
    fn evaluate_result(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        result: &StepResult,
    ) -> OrchestrationResult<ResultDisposition> {
        if instance.is_terminal() {
            return Ok(ResultDisposition::discarded(DiscardReason::Terminal));
        }
        if instance.status != WorkflowStatus::Running || !instance.is_outstanding(result) {
            return Ok(ResultDisposition::discarded(DiscardReason::Duplicate));
        }

        let index = instance.current_step;
        let step = definition.step(index).ok_or_else(|| {
            OrchestrationError::invalid_definition(
                definition.definition_ref().to_string(),
                format!("instance points past the last step ({index})"),
            )
        })?;

        match result.outcome {
            StepOutcome::Success => {
                instance.advance(&step.name, result.payload.clone());
                if definition.is_last_step(index) {
                    instance.apply(WorkflowEvent::Complete)?;
                    Ok(ResultDisposition::Completed)
                } else {
                    instance.apply(WorkflowEvent::Advance)?;
                    Ok(ResultDisposition::Advanced {
                        next_step: instance.current_step,
                    })
                }
            }
            StepOutcome::Failure | StepOutcome::Timeout => {
                let detail = result.error_detail();
                instance.apply(WorkflowEvent::step_failed_with_error(&detail))?;
                instance.outstanding = None;

                match self.supervisor.should_retry(instance, step) {
                    RetryDecision::Retry(delay) => {
                        instance.apply(WorkflowEvent::ScheduleRetry)?;
                        Ok(ResultDisposition::RetryScheduled {
                            delay,
                            next_attempt: instance.next_attempt(&step.name),
                        })
                    }
                    RetryDecision::Fail => {
                        let reason = format!(
                            "step {} exhausted {} attempts: {}",
                            step.name,
                            instance.attempts_for(&step.name),
                            detail
                        );
                        instance.apply(WorkflowEvent::fail_with_error(&reason))?;
                        Ok(ResultDisposition::Failed { reason })
                    }
                }
            }
        }
    }

    /// Side effects of an applied (or discarded) result
    async fn after_result(
        &self,
        instance: &WorkflowInstance,
        result: &StepResult,
        disposition: &ResultDisposition,
    ) -> OrchestrationResult<()> {
        let instance_id = instance.instance_id;

        if !disposition.is_discarded() {
            self.timers.cancel(instance_id, TimerKind::StepTimeout);
            match result.outcome {
                StepOutcome::Success => self.metrics.record_step_success(),
                StepOutcome::Failure => self.metrics.record_step_failure(),
                StepOutcome::Timeout => self.metrics.record_step_timeout(),
            }
            log_step_operation(
                "result",
                Some(instance_id),
                Some(&result.step_name),
                Some(result.attempt),
                instance.status.as_str(),
                result.error.as_deref(),
            );
        }

        match disposition {
            ResultDisposition::Advanced { .. } => {
                self.dispatch_step(instance.clone()).await?;
            }
            ResultDisposition::Completed => {
                self.timers.cancel_all(instance_id);
                self.metrics.record_completed();
                log_workflow_operation(
                    "complete",
                    Some(instance_id),
                    Some(&instance.definition.to_string()),
                    instance.status.as_str(),
                    None,
                );
            }
            ResultDisposition::RetryScheduled { delay, next_attempt } => {
                self.metrics.record_retry();
                self.timers.schedule(
                    instance_id,
                    TimerKind::Redispatch,
                    &result.step_name,
                    *next_attempt,
                    *delay,
                );
                info!(
                    instance_id = %instance_id,
                    step = %result.step_name,
                    next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    "🔁 Step retry scheduled"
                );
            }
            ResultDisposition::Failed { reason } => {
                self.timers.cancel_all(instance_id);
                self.metrics.record_failed();
                error!(instance_id = %instance_id, reason = %reason, "☠️ Workflow instance failed");
            }
            ResultDisposition::Discarded { reason } => {
                match reason {
                    DiscardReason::Duplicate => self.metrics.record_duplicate(),
                    DiscardReason::Terminal | DiscardReason::UnknownInstance => {
                        self.metrics.record_discarded()
                    }
                }
                debug!(
                    instance_id = %instance_id,
                    step = %result.step_name,
                    attempt = result.attempt,
                    status = %instance.status,
                    reason = %reason,
                    "Discarded step result"
                );
            }
        }

        Ok(())
    }

    /// Dispatch the current step of `instance` if it is waiting for one
    ///
    /// Returns the persisted state after the dispatch decision.
    pub async fn dispatch_step(&self, instance: WorkflowInstance) -> OrchestrationResult<WorkflowInstance> {
        let fallback = instance.clone();
        match self.dispatch_with_reload(instance).await {
            Err(err) if defers_dispatch(&err) => {
                self.defer_dispatch(&fallback, &err);
                Ok(fallback)
            }
            other => other,
        }
    }

    async fn dispatch_with_reload(&self, instance: WorkflowInstance) -> OrchestrationResult<WorkflowInstance> {
        let mut current = instance;
        let mut conflicts = 0;

        loop {
            match self.try_dispatch(current).await {
                Err(OrchestrationError::ConcurrentModification {
                    instance_id,
                    expected_version,
                }) => {
                    self.metrics.record_cas_conflict();
                    conflicts += 1;
                    if conflicts > self.config.max_cas_retries {
                        return Err(OrchestrationError::ConcurrentModification {
                            instance_id,
                            expected_version,
                        });
                    }
                    debug!(instance_id = %instance_id, conflicts, "Version conflict during dispatch, reloading");
                    current = self.reload(instance_id).await?;
                }
                other => return other,
            }
        }
    }

    /// Arm a re-dispatch after a store failure left the dispatch undone
    fn defer_dispatch(&self, instance: &WorkflowInstance, cause: &OrchestrationError) {
        if instance.is_terminal() {
            return;
        }
        let step_name = self
            .definitions
            .get(&instance.definition)
            .ok()
            .and_then(|d| d.step(instance.current_step).map(|s| s.name.clone()))
            .unwrap_or_default();
        let delay = self.config.dispatch_recovery_delay();

        self.metrics.record_deferred_dispatch();
        self.timers.schedule(
            instance.instance_id,
            TimerKind::Redispatch,
            &step_name,
            instance.next_attempt(&step_name),
            delay,
        );
        warn!(
            instance_id = %instance.instance_id,
            step = %step_name,
            delay_ms = delay.as_millis() as u64,
            error = %cause,
            "⚠️ Dispatch failed on the state store, re-dispatch scheduled"
        );
    }

    async fn try_dispatch(&self, mut instance: WorkflowInstance) -> OrchestrationResult<WorkflowInstance> {
        if !instance.needs_dispatch() {
            return Ok(instance);
        }

        let definition = self.definitions.get(&instance.definition)?;

        let skipped = skip_unmet_steps(&mut instance, &definition)?;
        if !skipped.is_empty() {
            let completes = instance.current_step >= definition.steps.len();
            if completes {
                instance.apply(WorkflowEvent::Complete)?;
            }
            instance.version = self.store.save(&instance).await?;

            for step_name in &skipped {
                self.metrics.record_skipped();
                warn!(
                    instance_id = %instance.instance_id,
                    step = %step_name,
                    "⏭️ Step condition not met, skipping"
                );
            }
            if completes {
                self.timers.cancel_all(instance.instance_id);
                self.metrics.record_completed();
                log_workflow_operation(
                    "complete",
                    Some(instance.instance_id),
                    Some(&instance.definition.to_string()),
                    instance.status.as_str(),
                    None,
                );
                return Ok(instance);
            }
        }

        let index = instance.current_step;
        let step = definition.step(index).cloned().ok_or_else(|| {
            OrchestrationError::invalid_definition(
                instance.definition.to_string(),
                format!("no step at index {index}"),
            )
        })?;

        let endpoint = match self.registry.resolve(&step.capability).await {
            Ok(endpoint) => endpoint,
            Err(err) => return self.registry_backoff(instance, &step, err).await,
        };

        let attempt = instance.next_attempt(&step.name);
        let idempotency_key =
            instance.record_dispatch(&step.name, index, attempt, endpoint.authority());
        if matches!(
            instance.status,
            WorkflowStatus::Pending | WorkflowStatus::Retrying
        ) {
            instance.apply(WorkflowEvent::Dispatch)?;
        }
        instance.version = self.store.save(&instance).await?;

        let message = StepMessage {
            message_id: Uuid::new_v4(),
            instance_id: instance.instance_id,
            definition: instance.definition.clone(),
            step_name: step.name.clone(),
            step_index: index,
            capability: step.capability.clone(),
            attempt,
            payload: instance.payload.clone(),
            context: instance.step_outputs.clone(),
            correlation_id: instance.correlation_id.clone(),
            idempotency_key,
            endpoint: endpoint.authority(),
            timeout_ms: step.timeout_ms,
            dispatched_at: chrono::Utc::now(),
        };

        // Armed before publishing so a fast result always finds it
        self.timers.schedule(
            instance.instance_id,
            TimerKind::StepTimeout,
            &step.name,
            attempt,
            step.timeout(),
        );

        let topic = topics::step_request(&step.capability);
        match self.publish_with_retry(&topic, &message).await {
            Ok(()) => {
                self.metrics.record_dispatch();
                log_step_operation(
                    "dispatch",
                    Some(instance.instance_id),
                    Some(&step.name),
                    Some(attempt),
                    instance.status.as_str(),
                    Some(&message.endpoint),
                );
                Ok(instance)
            }
            Err(err) => {
                let reason = err.to_string();
                let attempt_key = (step.name.clone(), attempt);
                let failed = self
                    .commit(instance, |inst| {
                        let still_outstanding = inst
                            .outstanding
                            .as_ref()
                            .map(|o| (o.step_name.clone(), o.attempt) == attempt_key)
                            .unwrap_or(false);
                        if inst.is_terminal() || !still_outstanding {
                            return Ok(false);
                        }
                        inst.apply(WorkflowEvent::fail_with_error(&reason))?;
                        Ok(true)
                    })
                    .await?;

                if failed.is_terminal() {
                    self.timers.cancel_all(failed.instance_id);
                }
                if failed.status == WorkflowStatus::Failed {
                    self.metrics.record_failed();
                    error!(
                        instance_id = %failed.instance_id,
                        topic = %topic,
                        error = %reason,
                        "☠️ Step request could not be published, failing instance"
                    );
                }
                Ok(failed)
            }
        }
    }

    /// Registry could not resolve the step's capability
    async fn registry_backoff(
        &self,
        mut instance: WorkflowInstance,
        step: &StepDefinition,
        err: RegistryError,
    ) -> OrchestrationResult<WorkflowInstance> {
        let cause = OrchestrationError::from(err);
        instance.registry_failures += 1;
        let failures = instance.registry_failures;

        match self.supervisor.registry_backoff(failures) {
            RetryDecision::Retry(delay) => {
                instance.apply(WorkflowEvent::RegistryBackoff)?;
                instance.last_error = Some(cause.to_string());
                instance.version = self.store.save(&instance).await?;

                self.metrics.record_registry_backoff();
                self.timers.schedule(
                    instance.instance_id,
                    TimerKind::Redispatch,
                    &step.name,
                    instance.next_attempt(&step.name),
                    delay,
                );
                warn!(
                    instance_id = %instance.instance_id,
                    capability = %step.capability,
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %cause,
                    "⚠️ Registry unavailable, backing off"
                );
            }
            RetryDecision::Fail => {
                let reason = format!("{cause} after {failures} registry attempts");
                instance.apply(WorkflowEvent::fail_with_error(&reason))?;
                instance.version = self.store.save(&instance).await?;

                self.timers.cancel_all(instance.instance_id);
                self.metrics.record_failed();
                error!(
                    instance_id = %instance.instance_id,
                    capability = %step.capability,
                    reason = %reason,
                    "☠️ Registry backoff exhausted, failing instance"
                );
            }
        }

        Ok(instance)
    }

    async fn publish_with_retry(&self, topic: &str, message: &StepMessage) -> OrchestrationResult<()> {
        let attempts = self.config.publish_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match publish_json(self.transport.as_ref(), topic, message).await {
                Ok(_) => {
                    debug!(topic = %topic, instance_id = %message.instance_id, attempt, "📤 Published step request");
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.record_publish_failure();
                    warn!(topic = %topic, attempt, attempts, error = %e, "Step request publish failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.publish_retry_delay(attempt)).await;
                    }
                }
            }
        }

        Err(OrchestrationError::TransportPublishFailure {
            topic: topic.to_string(),
            attempts,
            message: last_error,
        })
    }

    /// React to a fired timer
    #[instrument(skip(self, event), fields(instance_id = %event.instance_id, kind = ?event.kind))]
    pub async fn handle_timer(&self, event: TimerEvent) -> OrchestrationResult<()> {
        let Some(instance) = self.store.load(event.instance_id).await? else {
            debug!(instance_id = %event.instance_id, "Timer fired for unknown instance");
            return Ok(());
        };

        match event.kind {
            TimerKind::Redispatch => {
                if !instance.needs_dispatch() {
                    debug!(status = %instance.status, "Stale re-dispatch timer ignored");
                    return Ok(());
                }
                self.dispatch_step(instance).await?;
            }
            TimerKind::StepTimeout => {
                let timeout_ms = self
                    .definitions
                    .get(&instance.definition)?
                    .step_by_name(&event.step_name)
                    .map(|(_, step)| step.timeout_ms)
                    .unwrap_or_default();
                let result = StepResult::synthetic_timeout(
                    instance.instance_id,
                    &event.step_name,
                    event.attempt,
                    &instance.correlation_id,
                    timeout_ms,
                );
                self.on_step_result(result).await?;
            }
        }

        Ok(())
    }

    /// Consume timer events until the channel closes
    pub fn spawn_timer_loop(
        engine: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TimerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let instance_id = event.instance_id;
                    let kind = event.kind;
                    let step_name = event.step_name.clone();
                    let attempt = event.attempt;
                    if let Err(e) = engine.handle_timer(event).await {
                        warn!(instance_id = %instance_id, ?kind, error = %e, "Timer handling failed");
                        // A store outage must not drop the timer
                        if defers_dispatch(&e) {
                            engine.timers.schedule(
                                instance_id,
                                kind,
                                &step_name,
                                attempt,
                                engine.config.dispatch_recovery_delay(),
                            );
                        }
                    }
                });
            }
            debug!("Timer loop stopped");
        })
    }

    /// Pick up instances left in flight by a previous process
    ///
    /// Waiting instances are dispatched now; running ones get their step timeout
    /// re-armed for whatever remains of it.
    pub async fn resume_in_flight(&self) -> OrchestrationResult<usize> {
        let mut resumed = 0;

        for status in [
            WorkflowStatus::Pending,
            WorkflowStatus::Retrying,
            WorkflowStatus::Running,
        ] {
            for instance in self.store.list_by_status(status).await? {
                match &instance.outstanding {
                    Some(outstanding) => {
                        let timeout = self
                            .definitions
                            .get(&instance.definition)?
                            .step(outstanding.step_index)
                            .map(|s| s.timeout())
                            .unwrap_or_default();
                        let elapsed = (chrono::Utc::now() - outstanding.dispatched_at)
                            .to_std()
                            .unwrap_or(Duration::ZERO);
                        self.timers.schedule(
                            instance.instance_id,
                            TimerKind::StepTimeout,
                            &outstanding.step_name,
                            outstanding.attempt,
                            timeout.saturating_sub(elapsed),
                        );
                    }
                    None => {
                        self.dispatch_step(instance).await?;
                    }
                }
                resumed += 1;
            }
        }

        if resumed > 0 {
            info!(resumed, "🔎 Resumed in-flight workflow instances");
        }
        Ok(resumed)
    }

    async fn reload(&self, instance_id: Uuid) -> OrchestrationResult<WorkflowInstance> {
        self.store
            .load(instance_id)
            .await?
            .ok_or(OrchestrationError::InstanceNotFound { instance_id })
    }

    /// Mutate and save with reload-and-retry on version conflicts
    ///
    /// `mutate` returns `false` to leave the instance untouched, in which case the
    /// loaded state is returned without a write.
    async fn commit<F>(&self, mut instance: WorkflowInstance, mut mutate: F) -> OrchestrationResult<WorkflowInstance>
    where
        F: FnMut(&mut WorkflowInstance) -> OrchestrationResult<bool> + Send,
    {
        let mut conflicts = 0;
        loop {
            let mut candidate = instance.clone();
            if !mutate(&mut candidate)? {
                return Ok(instance);
            }

            match self.store.save(&candidate).await {
                Ok(version) => {
                    candidate.version = version;
                    return Ok(candidate);
                }
                Err(e) if e.is_conflict() => {
                    self.metrics.record_cas_conflict();
                    conflicts += 1;
                    if conflicts > self.config.max_cas_retries {
                        return Err(e.into());
                    }
                    debug!(instance_id = %candidate.instance_id, conflicts, "Version conflict, reloading");
                    instance = self.reload(candidate.instance_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Store failures and exhausted version conflicts clear on their own
fn defers_dispatch(err: &OrchestrationError) -> bool {
    matches!(
        err,
        OrchestrationError::Store(_) | OrchestrationError::ConcurrentModification { .. }
    )
}

/// Skip forward over steps whose condition does not hold; returns the skipped names
fn skip_unmet_steps(
    instance: &mut WorkflowInstance,
    definition: &WorkflowDefinition,
) -> OrchestrationResult<Vec<String>> {
    let mut skipped = Vec::new();
    while let Some(step) = definition.step(instance.current_step) {
        if step.runs_for(&instance.payload) {
            break;
        }
        instance.skip(&step.name)?;
        skipped.push(step.name.clone());
    }
    Ok(skipped)
}
