//! # Orchestration Bootstrap
//!
//! Wires a complete orchestrator from configuration:
//!
//! 1. logging
//! 2. state store (in-memory or PostgreSQL)
//! 3. transport and discovery backend (overridable, e.g. by tests)
//! 4. registry client start
//! 5. workflow definitions
//! 6. engine, timer loop and result listener
//! 7. trigger subscription
//! 8. recovery of instances left in flight
//!
//! [`OrchestrationSystem::shutdown`] stops everything in reverse order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::engine::{EngineComponents, OrchestrationEngine};
use super::result_listener::ResultListener;
use super::supervisor::RetrySupervisor;
use super::timers::TimerService;
use super::triggers::{TriggerHandler, TriggerRouter};
use crate::admin::{AdminSurface, OrchestrationMetrics};
use crate::config::{ConfigManager, ConfigurationError, StoreBackend, StoreConfig};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging;
use crate::messaging::{InMemoryTransport, MessageTransport, Subscription};
use crate::models::{DefinitionRef, WorkflowDefinition, WorkflowInstance};
use crate::registry::{DiscoveryBackend, InMemoryDiscovery, RegistryClient, WorkflowDefinitionRegistry};
use crate::state_machine::WorkflowStatus;
use crate::store::{InMemoryStateStore, PostgresStateStore, WorkflowStateStore};

/// Bootstrap overrides
#[derive(Clone, Default)]
pub struct BootstrapOptions {
    pub transport: Option<Arc<dyn MessageTransport>>,
    pub discovery: Option<Arc<dyn DiscoveryBackend>>,
    pub store: Option<Arc<dyn WorkflowStateStore>>,
    /// Install the global tracing subscriber from the logging section
    pub init_logging: bool,
    /// Skip re-dispatching instances found in flight in the store
    pub skip_recovery: bool,
}

impl BootstrapOptions {
    /// Defaults for a standalone process
    pub fn standalone() -> Self {
        Self {
            init_logging: true,
            ..Self::default()
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryBackend>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn WorkflowStateStore>) -> Self {
        self.store = Some(store);
        self
    }
}

/// System status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub running: bool,
    pub environment: String,
    pub store_backend: &'static str,
    pub transport: &'static str,
    pub definitions: usize,
    pub result_topics: Vec<String>,
    pub triggers_enabled: bool,
}

/// A running orchestrator
pub struct OrchestrationSystem {
    config_manager: Arc<ConfigManager>,
    engine: Arc<OrchestrationEngine>,
    transport: Arc<dyn MessageTransport>,
    registry: RegistryClient,
    listener: ResultListener,
    admin: AdminSurface,
    trigger_subscription: Mutex<Option<Subscription>>,
    timer_loop: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

pub struct OrchestrationBootstrap;

impl OrchestrationBootstrap {
    /// Load configuration from the environment and bootstrap a standalone system
    pub async fn bootstrap_standalone() -> OrchestrationResult<OrchestrationSystem> {
        let config_manager = ConfigManager::load()?;
        Self::bootstrap(config_manager, BootstrapOptions::standalone()).await
    }

    pub async fn bootstrap(
        config_manager: Arc<ConfigManager>,
        options: BootstrapOptions,
    ) -> OrchestrationResult<OrchestrationSystem> {
        let config = config_manager.config();

        if options.init_logging {
            logging::init_with_config(&config.logging);
        }
        info!(environment = %config_manager.environment(), "🚀 BOOTSTRAP: Starting orchestrator");

        let store = match options.store {
            Some(store) => store,
            None => build_store(&config.store).await?,
        };
        let transport: Arc<dyn MessageTransport> = match options.transport {
            Some(transport) => transport,
            None => Arc::new(InMemoryTransport::from_config(&config.transport)),
        };
        let discovery: Arc<dyn DiscoveryBackend> = match options.discovery {
            Some(discovery) => discovery,
            None => Arc::new(InMemoryDiscovery::from_static(
                &config.registry.static_services,
            )),
        };
        info!(
            store = store.backend_name(),
            transport = transport.transport_name(),
            discovery = discovery.backend_name(),
            "✅ BOOTSTRAP: Backends ready"
        );

        let registry = RegistryClient::new(discovery, &config.registry);
        registry.start().await?;

        let definitions = Arc::new(WorkflowDefinitionRegistry::new());
        for definition in &config.definitions {
            definitions.register(definition.clone())?;
        }
        info!(definitions = definitions.len(), "✅ BOOTSTRAP: Workflow definitions registered");

        let (timers, timer_events) = TimerService::new();
        let engine = Arc::new(OrchestrationEngine::new(EngineComponents {
            definitions: definitions.clone(),
            store,
            transport: transport.clone(),
            registry: registry.clone(),
            supervisor: RetrySupervisor::new(config.backoff.clone()),
            timers,
            metrics: Arc::new(OrchestrationMetrics::new()),
            config: config.engine.clone(),
        }));
        let timer_loop = OrchestrationEngine::spawn_timer_loop(engine.clone(), timer_events);

        let listener = ResultListener::new(
            engine.clone(),
            transport.clone(),
            config.engine.result_consumers,
        );
        listener.start().await?;

        let trigger_subscription = if config.triggers.enabled && !config.triggers.routes.is_empty() {
            let router = TriggerRouter::from_config(&config.triggers)?;
            router.validate(&definitions)?;
            let routes = router.len();
            let handler = Arc::new(TriggerHandler::new(router, engine.clone()));
            let subscription = transport.subscribe(&config.triggers.topic, handler).await?;
            info!(topic = %config.triggers.topic, routes, "✅ BOOTSTRAP: Trigger routes active");
            Some(subscription)
        } else {
            info!("📋 BOOTSTRAP: No trigger routes configured");
            None
        };

        if !options.skip_recovery {
            engine.resume_in_flight().await?;
        }

        let admin = AdminSurface::new(engine.clone(), transport.clone(), registry.clone());

        info!("🎉 BOOTSTRAP: Orchestrator running");
        Ok(OrchestrationSystem {
            config_manager,
            engine,
            transport,
            registry,
            listener,
            admin,
            trigger_subscription: Mutex::new(trigger_subscription),
            timer_loop: Mutex::new(Some(timer_loop)),
            running: AtomicBool::new(true),
        })
    }
}

async fn build_store(config: &StoreConfig) -> OrchestrationResult<Arc<dyn WorkflowStateStore>> {
    match config.backend {
        StoreBackend::InMemory => Ok(Arc::new(InMemoryStateStore::new())),
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                ConfigurationError::missing_required_field(
                    "store.database_url",
                    "postgres store configuration",
                )
            })?;
            let store = PostgresStateStore::connect_with_pool_size(url, config.max_connections).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

impl OrchestrationSystem {
    pub fn engine(&self) -> &Arc<OrchestrationEngine> {
        &self.engine
    }

    pub fn admin(&self) -> &AdminSurface {
        &self.admin
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start(&self, definition: &DefinitionRef, payload: serde_json::Value) -> OrchestrationResult<Uuid> {
        self.ensure_running()?;
        self.engine.start(definition, payload).await
    }

    pub async fn status(&self, instance_id: Uuid) -> OrchestrationResult<WorkflowInstance> {
        self.engine.status(instance_id).await
    }

    pub async fn cancel(&self, instance_id: Uuid) -> OrchestrationResult<WorkflowStatus> {
        self.engine.cancel(instance_id).await
    }

    /// Register a definition at runtime and subscribe to any new result topics
    pub async fn register_definition(&self, definition: WorkflowDefinition) -> OrchestrationResult<DefinitionRef> {
        let reference = self.engine.definitions().register(definition)?;
        self.listener.start().await?;
        Ok(reference)
    }

    pub async fn system_status(&self) -> SystemStatus {
        SystemStatus {
            running: self.is_running(),
            environment: self.config_manager.environment().to_string(),
            store_backend: self.engine.store().backend_name(),
            transport: self.transport.transport_name(),
            definitions: self.engine.definitions().len(),
            result_topics: self.listener.topics().await,
            triggers_enabled: self.trigger_subscription.lock().await.is_some(),
        }
    }

    /// Stop intake, then result processing, then timers and the registry
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator already stopped");
            return;
        }
        info!("🛑 Orchestrator shutdown requested");

        if let Some(subscription) = self.trigger_subscription.lock().await.take() {
            subscription.unsubscribe().await;
        }
        self.listener.shutdown().await;

        if let Some(handle) = self.timer_loop.lock().await.take() {
            handle.abort();
        }
        self.engine.timers().shutdown();
        self.registry.shutdown();

        info!("✅ Orchestrator stopped");
    }

    fn ensure_running(&self) -> OrchestrationResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(OrchestrationError::Messaging(
                "orchestrator is shut down".to_string(),
            ))
        }
    }
}
