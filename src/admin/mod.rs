//! # Admin Surface
//!
//! Read-only view of a running orchestrator: health probes, instance status and
//! counters. An HTTP layer would wrap these calls one to one.

pub mod health;
pub mod metrics;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

pub use health::{format_uptime, HealthCheck, HealthReport, HealthStatus};
pub use metrics::{MetricsSnapshot, OrchestrationMetrics};

use crate::constants::system::ORQUESTADOR_VERSION;
use crate::error::OrchestrationResult;
use crate::messaging::MessageTransport;
use crate::models::WorkflowInstance;
use crate::orchestration::engine::OrchestrationEngine;
use crate::registry::{RegistryClient, RegistryStats};
use crate::state_machine::WorkflowStatus;
use health::connection_state;

/// Status view of one workflow instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceStatusView {
    pub instance_id: Uuid,
    pub definition: String,
    pub status: WorkflowStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub attempts: BTreeMap<String, u32>,
    pub outstanding_step: Option<String>,
    pub last_error: Option<String>,
    pub correlation_id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceStatusView {
    fn from_instance(instance: WorkflowInstance, total_steps: usize) -> Self {
        Self {
            instance_id: instance.instance_id,
            definition: instance.definition.to_string(),
            status: instance.status,
            current_step: instance.current_step,
            total_steps,
            attempts: instance.attempts,
            outstanding_step: instance.outstanding.map(|o| o.step_name),
            last_error: instance.last_error,
            correlation_id: instance.correlation_id,
            version: instance.version,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        }
    }
}

/// Counters plus store and transport gauges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminMetrics {
    pub counters: MetricsSnapshot,
    pub instances_by_status: BTreeMap<String, u64>,
    pub dead_letters: u64,
    pub pending_timers: usize,
    pub registry: RegistryStats,
}

pub struct AdminSurface {
    engine: Arc<OrchestrationEngine>,
    transport: Arc<dyn MessageTransport>,
    registry: RegistryClient,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl AdminSurface {
    pub fn new(
        engine: Arc<OrchestrationEngine>,
        transport: Arc<dyn MessageTransport>,
        registry: RegistryClient,
    ) -> Self {
        Self {
            engine,
            transport,
            registry,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> String {
        format_uptime(self.started.elapsed())
    }

    async fn transport_connected(&self) -> bool {
        match self.transport.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(transport = self.transport.transport_name(), error = %e, "Transport health check failed");
                false
            }
        }
    }

    /// Ready to accept work: transport reachable and registry started
    pub async fn readiness(&self) -> HealthReport {
        let connected = self.transport_connected().await;
        let ready = connected && self.registry.is_started();

        HealthReport::from_checks(vec![HealthCheck::new(
            "Readiness check",
            HealthStatus::from_bool(ready),
        )
        .with("from", json!(self.started_at.to_rfc3339()))
        .with("status", json!(if ready { "READY" } else { "NOT_READY" }))
        .with("version", json!(ORQUESTADOR_VERSION))
        .with("uptime", json!(self.uptime()))
        .with("transport", connection_state(connected))])
    }

    pub fn liveness(&self) -> HealthReport {
        HealthReport::from_checks(vec![self.liveness_check()])
    }

    fn liveness_check(&self) -> HealthCheck {
        HealthCheck::new("Liveness check", HealthStatus::Up)
            .with("from", json!(self.started_at.to_rfc3339()))
            .with("status", json!("ALIVE"))
            .with("version", json!(ORQUESTADOR_VERSION))
            .with("uptime", json!(self.uptime()))
            .with("pending_timers", json!(self.engine.timers().pending()))
    }

    /// Every check: readiness, liveness, transport and registry
    pub async fn health(&self) -> HealthReport {
        let connected = self.transport_connected().await;
        let ready = connected && self.registry.is_started();

        let readiness = HealthCheck::new("Readiness check", HealthStatus::from_bool(ready))
            .with("from", json!(self.started_at.to_rfc3339()))
            .with("status", json!(if ready { "READY" } else { "NOT_READY" }))
            .with("version", json!(ORQUESTADOR_VERSION))
            .with("uptime", json!(self.uptime()));

        let transport = HealthCheck::new("Transport check", HealthStatus::from_bool(connected))
            .with("transport", json!(self.transport.transport_name()))
            .with("status", connection_state(connected));

        let registry = match self.registry.health_check().await {
            Ok(capabilities) => HealthCheck::new("Registry check", HealthStatus::Up)
                .with("status", connection_state(true))
                .with("capabilities", json!(capabilities)),
            Err(e) => {
                warn!(error = %e, "Registry health check failed");
                HealthCheck::new("Registry check", HealthStatus::Down)
                    .with("status", connection_state(false))
                    .with("error", json!(e.to_string()))
            }
        };

        let report =
            HealthReport::from_checks(vec![readiness, self.liveness_check(), transport, registry]);
        debug!(status = %report.status, "Health check complete");
        report
    }

    pub async fn instance_status(&self, instance_id: Uuid) -> OrchestrationResult<InstanceStatusView> {
        let instance = self.engine.status(instance_id).await?;
        let total_steps = self
            .engine
            .definitions()
            .get(&instance.definition)
            .map(|d| d.steps.len())
            .unwrap_or_default();
        Ok(InstanceStatusView::from_instance(instance, total_steps))
    }

    pub async fn metrics(&self) -> OrchestrationResult<AdminMetrics> {
        let instances_by_status = self
            .engine
            .store()
            .count_by_status()
            .await?
            .into_iter()
            .map(|(status, count)| (status.as_str().to_string(), count))
            .collect();

        Ok(AdminMetrics {
            counters: self.engine.metrics().snapshot(),
            instances_by_status,
            dead_letters: self.transport.dead_letter_count().await,
            pending_timers: self.engine.timers().pending(),
            registry: self.registry.stats(),
        })
    }
}
