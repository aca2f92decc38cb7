//! # Registry Client
//!
//! Resolves capability names to live endpoints with a bounded-staleness cache.
//!
//! ## Cache lifecycle
//!
//! - `start()` populates the cache from the backend catalog and spawns the refresh
//!   poller and the membership watcher
//! - entries younger than `cache_ttl` are served without touching the backend
//! - older entries trigger a backend lookup bounded by `resolve_timeout`; if the backend
//!   fails, entries younger than `staleness_bound` are still served
//! - `shutdown()` stops the background tasks and clears the cache

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::discovery::DiscoveryBackend;
use super::endpoint::ServiceEndpoint;
use super::errors::{RegistryError, RegistryResult};
use crate::config::RegistryConfig;

#[derive(Debug, Clone)]
struct CachedEndpoints {
    endpoints: Vec<ServiceEndpoint>,
    fetched_at: Instant,
}

impl CachedEndpoints {
    fn live(&self) -> Vec<&ServiceEndpoint> {
        self.endpoints.iter().filter(|e| e.alive).collect()
    }
}

/// Cache and lookup counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub cache_hits: u64,
    pub backend_lookups: u64,
    pub stale_serves: u64,
    pub failures: u64,
    pub cached_capabilities: usize,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    backend_lookups: AtomicU64,
    stale_serves: AtomicU64,
    failures: AtomicU64,
}

struct RegistryInner {
    backend: Arc<dyn DiscoveryBackend>,
    cache_ttl: Duration,
    staleness_bound: Duration,
    resolve_timeout: Duration,
    poll_interval: Duration,
    cache: DashMap<String, CachedEndpoints>,
    cursors: DashMap<String, Arc<AtomicUsize>>,
    counters: Counters,
}

impl RegistryInner {
    fn pick(&self, capability: &str, cached: &CachedEndpoints) -> Option<ServiceEndpoint> {
        let live = cached.live();
        if live.is_empty() {
            return None;
        }
        let cursor = self
            .cursors
            .entry(capability.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone();
        let index = cursor.fetch_add(1, Ordering::Relaxed) % live.len();
        Some(live[index].clone())
    }

    async fn fetch(&self, capability: &str) -> RegistryResult<Vec<ServiceEndpoint>> {
        self.counters.backend_lookups.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.resolve_timeout, self.backend.lookup(capability)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout {
                capability: capability.to_string(),
                timeout_ms: self.resolve_timeout.as_millis() as u64,
            }),
        }
    }

    async fn refresh(&self, capability: &str) -> RegistryResult<()> {
        let endpoints = self.fetch(capability).await?;
        self.cache.insert(
            capability.to_string(),
            CachedEndpoints {
                endpoints,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn refresh_all(&self) {
        let capabilities: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        for capability in capabilities {
            if let Err(e) = self.refresh(&capability).await {
                debug!(capability = %capability, error = %e, "Periodic registry refresh failed");
            }
        }
    }
}

/// Resolves capabilities through a [`DiscoveryBackend`]
#[derive(Clone)]
pub struct RegistryClient {
    inner: Arc<RegistryInner>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    started: Arc<AtomicBool>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("backend", &self.inner.backend.backend_name())
            .field("cached_capabilities", &self.inner.cache.len())
            .field("started", &self.is_started())
            .finish()
    }
}

impl RegistryClient {
    pub fn new(backend: Arc<dyn DiscoveryBackend>, config: &RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                cache_ttl: config.cache_ttl(),
                staleness_bound: config.staleness_bound(),
                resolve_timeout: config.resolve_timeout(),
                poll_interval: config.poll_interval(),
                cache: DashMap::new(),
                cursors: DashMap::new(),
                counters: Counters::default(),
            }),
            tasks: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Populate the cache and start background refresh
    ///
    /// A backend that is down at startup is logged, not fatal: the cache fills on demand.
    pub async fn start(&self) -> RegistryResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match tokio::time::timeout(self.inner.resolve_timeout, self.inner.backend.catalog()).await
        {
            Ok(Ok(catalog)) => {
                let now = Instant::now();
                for (capability, endpoints) in catalog {
                    self.inner.cache.insert(
                        capability,
                        CachedEndpoints {
                            endpoints,
                            fetched_at: now,
                        },
                    );
                }
                info!(
                    backend = self.inner.backend.backend_name(),
                    capabilities = self.inner.cache.len(),
                    "🔎 Registry cache populated"
                );
            }
            Ok(Err(e)) => warn!(error = %e, "Registry catalog unavailable at startup"),
            Err(_) => warn!("Registry catalog timed out at startup"),
        }

        let poller = {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(inner.poll_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    inner.refresh_all().await;
                }
            })
        };

        let watcher = {
            let inner = self.inner.clone();
            let mut events = inner.backend.watch();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            let capability = event.capability().to_string();
                            debug!(capability = %capability, ?event, "Membership change");
                            if let Err(e) = inner.refresh(&capability).await {
                                warn!(capability = %capability, error = %e, "Refresh after membership change failed");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Membership watch lagged, refreshing all");
                            inner.refresh_all().await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        let mut tasks = self.tasks.lock();
        tasks.push(poller);
        tasks.push(watcher);
        Ok(())
    }

    /// Stop background refresh and drop every cached entry
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.cache.clear();
        self.inner.cursors.clear();
        self.started.store(false, Ordering::SeqCst);
        info!("Registry client shut down");
    }

    /// Resolve a capability to one live endpoint, round-robin among live members
    pub async fn resolve(&self, capability: &str) -> RegistryResult<ServiceEndpoint> {
        let inner = &self.inner;

        let cached = inner.cache.get(capability).map(|e| e.value().clone());
        if let Some(cached) = &cached {
            if cached.fetched_at.elapsed() < inner.cache_ttl {
                if let Some(endpoint) = inner.pick(capability, cached) {
                    inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(endpoint);
                }
            }
        }

        match inner.fetch(capability).await {
            Ok(endpoints) => {
                let fresh = CachedEndpoints {
                    endpoints,
                    fetched_at: Instant::now(),
                };
                inner.cache.insert(capability.to_string(), fresh.clone());
                inner.pick(capability, &fresh).ok_or_else(|| {
                    inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                    RegistryError::NoLiveEndpoint {
                        capability: capability.to_string(),
                    }
                })
            }
            Err(err) => {
                if let Some(cached) = &cached {
                    let age = cached.fetched_at.elapsed();
                    if age < inner.staleness_bound {
                        if let Some(endpoint) = inner.pick(capability, cached) {
                            inner.counters.stale_serves.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                capability = %capability,
                                age_ms = age.as_millis() as u64,
                                error = %err,
                                "⚠️ Serving stale registry entry"
                            );
                            return Ok(endpoint);
                        }
                    }
                }

                inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                Err(match err {
                    RegistryError::Backend { message } => {
                        RegistryError::unavailable(capability, message)
                    }
                    other => other,
                })
            }
        }
    }

    /// Probe the backend within the resolve timeout
    pub async fn health_check(&self) -> RegistryResult<usize> {
        match tokio::time::timeout(self.inner.resolve_timeout, self.inner.backend.catalog()).await {
            Ok(Ok(catalog)) => Ok(catalog.len()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RegistryError::Timeout {
                capability: "*".to_string(),
                timeout_ms: self.inner.resolve_timeout.as_millis() as u64,
            }),
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let c = &self.inner.counters;
        RegistryStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            backend_lookups: c.backend_lookups.load(Ordering::Relaxed),
            stale_serves: c.stale_serves.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            cached_capabilities: self.inner.cache.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryDiscovery;

    fn config(cache_ttl_ms: u64, staleness_bound_ms: u64) -> RegistryConfig {
        RegistryConfig {
            cache_ttl_ms,
            staleness_bound_ms,
            resolve_timeout_ms: 50,
            poll_interval_ms: 60_000,
            static_services: vec![],
        }
    }

    fn discovery() -> Arc<InMemoryDiscovery> {
        let d = Arc::new(InMemoryDiscovery::new());
        d.register(ServiceEndpoint::new("email", "e1", "10.0.0.1", 25));
        d.register(ServiceEndpoint::new("email", "e2", "10.0.0.2", 25));
        d
    }

    #[tokio::test]
    async fn test_round_robin_among_live_endpoints() {
        let d = discovery();
        let client = RegistryClient::new(d.clone(), &config(10_000, 20_000));
        client.start().await.unwrap();

        let a = client.resolve("email").await.unwrap();
        let b = client.resolve("email").await.unwrap();
        assert_ne!(a.service_id, b.service_id);

        let stats = client.stats();
        assert_eq!(stats.cache_hits, 2);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_dead_endpoints_are_skipped() {
        let d = discovery();
        d.set_alive("email", "e1", false);
        let client = RegistryClient::new(d.clone(), &config(0, 20_000));

        for _ in 0..4 {
            assert_eq!(client.resolve("email").await.unwrap().service_id, "e2");
        }
    }

    #[tokio::test]
    async fn test_unknown_capability_has_no_live_endpoint() {
        let client = RegistryClient::new(discovery(), &config(0, 0));
        assert!(matches!(
            client.resolve("fax").await,
            Err(RegistryError::NoLiveEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_entry_served_within_bound() {
        let d = discovery();
        let client = RegistryClient::new(d.clone(), &config(0, 60_000));
        client.resolve("email").await.unwrap();

        d.set_available(false);
        let endpoint = client.resolve("email").await.unwrap();
        assert_eq!(endpoint.capability, "email");
        assert_eq!(client.stats().stale_serves, 1);
    }

    #[tokio::test]
    async fn test_unavailable_beyond_staleness_bound() {
        let d = discovery();
        let client = RegistryClient::new(d.clone(), &config(0, 0));
        client.resolve("email").await.unwrap();

        d.set_available(false);
        assert!(matches!(
            client.resolve("email").await,
            Err(RegistryError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let d = discovery();
        d.set_latency(Some(Duration::from_millis(500)));
        let client = RegistryClient::new(d.clone(), &config(0, 0));

        assert!(matches!(
            client.resolve("email").await,
            Err(RegistryError::Timeout { timeout_ms: 50, .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_clears_cache() {
        let client = RegistryClient::new(discovery(), &config(10_000, 10_000));
        client.start().await.unwrap();
        assert_eq!(client.stats().cached_capabilities, 1);

        client.shutdown();
        assert_eq!(client.stats().cached_capabilities, 0);
        assert!(!client.is_started());
    }

    #[tokio::test]
    async fn test_watch_refreshes_cache() {
        let d = discovery();
        let client = RegistryClient::new(d.clone(), &config(60_000, 60_000));
        client.start().await.unwrap();

        d.register(ServiceEndpoint::new("sms", "s1", "10.0.0.9", 5060));

        for _ in 0..100 {
            if client.stats().cached_capabilities == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.stats().cached_capabilities, 2);

        let lookups_before = d.lookup_count();
        let endpoint = client.resolve("sms").await.unwrap();
        assert_eq!(endpoint.service_id, "s1");
        // Served from cache, no extra lookup
        assert_eq!(d.lookup_count(), lookups_before);
        client.shutdown();
    }
}
