//! Orquestador Binary
//!
//! Runs a standalone orchestrator: configuration from `ORQUESTADOR_CONFIG` or
//! `config/orquestador.toml`, in-process transport, static service discovery.
//! Set `ORQUESTADOR_DEMO_WORKERS=1` to also serve every configured capability with a
//! logging worker.

use anyhow::Context;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use orquestador::config::ConfigManager;
use orquestador::models::StepMessage;
use orquestador::orchestration::{BootstrapOptions, OrchestrationBootstrap};
use orquestador::worker::{CapabilityRegistry, CapabilityWorker, FnStepHandler, StepHandlerError};

const DEMO_WORKERS_ENV: &str = "ORQUESTADOR_DEMO_WORKERS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigManager::load().context("failed to load configuration")?;
    let system = OrchestrationBootstrap::bootstrap(config, BootstrapOptions::standalone())
        .await
        .context("failed to bootstrap orchestrator")?;

    let worker = if std::env::var(DEMO_WORKERS_ENV).is_ok_and(|v| v == "1" || v == "true") {
        let mut registry = CapabilityRegistry::new();
        for capability in system.engine().definitions().capabilities() {
            let handler = FnStepHandler::new(|message: StepMessage| async move {
                info!(
                    capability = %message.capability,
                    step = %message.step_name,
                    instance_id = %message.instance_id,
                    attempt = message.attempt,
                    "🔧 Demo worker executing step"
                );
                Ok::<_, StepHandlerError>(json!({ "handled_by": message.endpoint }))
            });
            registry.register(capability, Arc::new(handler));
        }
        let worker = CapabilityWorker::new(system.transport().clone(), registry);
        worker.start().await.context("failed to start demo workers")?;
        Some(worker)
    } else {
        None
    };

    let status = system.system_status().await;
    info!(
        environment = %status.environment,
        store = status.store_backend,
        definitions = status.definitions,
        triggers = status.triggers_enabled,
        "Orquestador ready, press Ctrl-C to stop"
    );

    signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    system.shutdown().await;
    Ok(())
}
