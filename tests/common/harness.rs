use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

use orquestador::config::{ConfigManager, OrquestadorConfig};
use orquestador::constants::topics;
use orquestador::messaging::{
    InMemoryTransport, MessageHandler, MessageTransport, MessagingError, MessagingResult,
    Subscription, TransportMessage,
};
use orquestador::models::WorkflowInstance;
use orquestador::orchestration::{BootstrapOptions, OrchestrationBootstrap, OrchestrationSystem};
use orquestador::registry::InMemoryDiscovery;
use orquestador::state_machine::WorkflowStatus;
use orquestador::store::{InMemoryStateStore, StoreError, StoreResult, WorkflowStateStore};
use orquestador::worker::{CapabilityRegistry, CapabilityWorker, StepHandler};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A bootstrapped orchestrator plus the in-memory backends behind it
pub struct TestHarness {
    pub system: OrchestrationSystem,
    pub transport: InMemoryTransport,
    pub discovery: Arc<InMemoryDiscovery>,
    workers: Vec<CapabilityWorker>,
}

impl TestHarness {
    pub async fn start(config: OrquestadorConfig, discovery: InMemoryDiscovery) -> Self {
        let transport = InMemoryTransport::from_config(&config.transport);
        Self::start_with(config, discovery, transport, BootstrapOptions::default()).await
    }

    /// Bootstrap with overrides; `transport` is used unless `options` already carries one
    pub async fn start_with(
        config: OrquestadorConfig,
        discovery: InMemoryDiscovery,
        transport: InMemoryTransport,
        mut options: BootstrapOptions,
    ) -> Self {
        let discovery = Arc::new(discovery);
        if options.transport.is_none() {
            options = options.with_transport(Arc::new(transport.clone()));
        }
        options = options.with_discovery(discovery.clone());

        let manager = ConfigManager::from_config(config).expect("test config is valid");
        let system = OrchestrationBootstrap::bootstrap(manager, options)
            .await
            .expect("bootstrap succeeds");

        Self {
            system,
            transport,
            discovery,
            workers: Vec::new(),
        }
    }

    /// Serve `capability` with `handler` on a fresh worker
    pub async fn serve(&mut self, capability: &str, handler: Arc<dyn StepHandler>) {
        self.add_worker(CapabilityRegistry::new().with_handler(capability, handler))
            .await;
    }

    pub async fn add_worker(&mut self, registry: CapabilityRegistry) {
        let worker = CapabilityWorker::new(Arc::new(self.transport.clone()), registry);
        worker.start().await.expect("worker starts");
        self.workers.push(worker);
    }

    pub async fn status(&self, instance_id: Uuid) -> WorkflowInstance {
        self.system
            .status(instance_id)
            .await
            .expect("instance exists")
    }

    /// Poll until the instance reaches `status`
    pub async fn wait_for_status(&self, instance_id: Uuid, status: WorkflowStatus) -> WorkflowInstance {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let instance = self.status(instance_id).await;
            if instance.status == status {
                return instance;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "instance {instance_id} stuck in {} waiting for {status} (last error: {:?})",
                    instance.status, instance.last_error
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn shutdown(self) {
        for worker in &self.workers {
            worker.shutdown().await;
        }
        self.system.shutdown().await;
    }
}

/// Poll `condition` until it holds or the wait times out
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// State store that can hold a number of saves at a barrier
///
/// Arming with `n` makes the next `n` saves wait for each other, so concurrent
/// writers all read the same version before any of them commits.
pub struct GatedStore {
    inner: InMemoryStateStore,
    armed: AtomicUsize,
    barrier: Mutex<Option<Arc<Barrier>>>,
}

impl GatedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStateStore::new(),
            armed: AtomicUsize::new(0),
            barrier: Mutex::new(None),
        })
    }

    pub fn arm(&self, saves: usize) {
        *self.barrier.lock() = Some(Arc::new(Barrier::new(saves)));
        self.armed.store(saves, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowStateStore for GatedStore {
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<u64> {
        let gated = self
            .armed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let barrier = if gated { self.barrier.lock().clone() } else { None };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        self.inner.save(instance).await
    }

    async fn load(&self, instance_id: Uuid) -> StoreResult<Option<WorkflowInstance>> {
        self.inner.load(instance_id).await
    }

    async fn list_by_status(&self, status: WorkflowStatus) -> StoreResult<Vec<WorkflowInstance>> {
        self.inner.list_by_status(status).await
    }

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, u64>> {
        self.inner.count_by_status().await
    }

    fn backend_name(&self) -> &'static str {
        "gated"
    }
}

/// State store that fails chosen saves with a database error
///
/// `fail_saves(skip, count)` lets the next `skip` saves through, then fails `count`.
pub struct FlakyStore {
    inner: InMemoryStateStore,
    pass: AtomicUsize,
    fail: AtomicUsize,
    failed: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStateStore::new(),
            pass: AtomicUsize::new(0),
            fail: AtomicUsize::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn fail_saves(&self, skip: usize, count: usize) {
        self.pass.store(skip, Ordering::SeqCst);
        self.fail.store(count, Ordering::SeqCst);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStateStore for FlakyStore {
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<u64> {
        let let_through = self
            .pass
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !let_through
            && self
                .fail
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.save(instance).await
    }

    async fn load(&self, instance_id: Uuid) -> StoreResult<Option<WorkflowInstance>> {
        self.inner.load(instance_id).await
    }

    async fn list_by_status(&self, status: WorkflowStatus) -> StoreResult<Vec<WorkflowInstance>> {
        self.inner.list_by_status(status).await
    }

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, u64>> {
        self.inner.count_by_status().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Transport whose step-request publishes can be switched off
pub struct FailingTransport {
    inner: InMemoryTransport,
    fail_requests: AtomicBool,
    rejected: AtomicU64,
}

impl FailingTransport {
    pub fn new(inner: InMemoryTransport) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_requests: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
        })
    }

    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for FailingTransport {
    async fn publish(&self, topic: &str, message: TransportMessage) -> MessagingResult<Uuid> {
        if self.fail_requests.load(Ordering::SeqCst) && topic.ends_with(topics::STEP_REQUEST_SUFFIX) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(MessagingError::publish(topic, "broker unavailable"));
        }
        self.inner.publish(topic, message).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription> {
        self.inner.subscribe(topic, handler).await
    }

    async fn dead_letters(&self, topic: &str) -> MessagingResult<Vec<TransportMessage>> {
        self.inner.dead_letters(topic).await
    }

    async fn dead_letter_count(&self) -> u64 {
        self.inner.dead_letter_count().await
    }

    async fn health_check(&self) -> MessagingResult<()> {
        self.inner.health_check().await
    }

    fn transport_name(&self) -> &'static str {
        "failing"
    }
}
