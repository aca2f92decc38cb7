//! # Discovery Backends
//!
//! [`DiscoveryBackend`] is the protocol the registry client consumes: point lookups,
//! a full catalog, and a stream of membership changes. [`InMemoryDiscovery`] serves
//! static deployments (`registry.static_services`) and tests, and can simulate an
//! outage or a slow backend.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::endpoint::ServiceEndpoint;
use super::errors::{RegistryError, RegistryResult};
use crate::config::StaticServiceConfig;

/// Membership change pushed by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipEvent {
    Registered {
        endpoint: ServiceEndpoint,
    },
    Deregistered {
        capability: String,
        service_id: String,
    },
    AvailabilityChanged {
        capability: String,
        service_id: String,
        alive: bool,
    },
}

impl MembershipEvent {
    pub fn capability(&self) -> &str {
        match self {
            Self::Registered { endpoint } => &endpoint.capability,
            Self::Deregistered { capability, .. } | Self::AvailabilityChanged { capability, .. } => {
                capability
            }
        }
    }
}

#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// All registered endpoints for a capability, live or not
    async fn lookup(&self, capability: &str) -> RegistryResult<Vec<ServiceEndpoint>>;

    /// Every registered endpoint, grouped by capability
    async fn catalog(&self) -> RegistryResult<HashMap<String, Vec<ServiceEndpoint>>>;

    /// Subscribe to membership changes
    fn watch(&self) -> broadcast::Receiver<MembershipEvent>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug)]
pub struct InMemoryDiscovery {
    services: DashMap<String, Vec<ServiceEndpoint>>,
    events: broadcast::Sender<MembershipEvent>,
    available: AtomicBool,
    latency: Mutex<Option<Duration>>,
    lookups: AtomicU64,
}

impl Default for InMemoryDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            services: DashMap::new(),
            events,
            available: AtomicBool::new(true),
            latency: Mutex::new(None),
            lookups: AtomicU64::new(0),
        }
    }

    pub fn from_static(services: &[StaticServiceConfig]) -> Self {
        let discovery = Self::new();
        for service in services {
            discovery.register(ServiceEndpoint::new(
                service.capability.clone(),
                service.service_id.clone(),
                service.address.clone(),
                service.port,
            ));
        }
        info!(
            services = services.len(),
            "📚 Static discovery backend loaded"
        );
        discovery
    }

    pub fn register(&self, endpoint: ServiceEndpoint) {
        let mut entry = self.services.entry(endpoint.capability.clone()).or_default();
        entry.retain(|e| e.service_id != endpoint.service_id);
        entry.push(endpoint.clone());
        drop(entry);

        debug!(endpoint = %endpoint, "Endpoint registered");
        let _ = self.events.send(MembershipEvent::Registered { endpoint });
    }

    pub fn deregister(&self, capability: &str, service_id: &str) {
        if let Some(mut entry) = self.services.get_mut(capability) {
            entry.retain(|e| e.service_id != service_id);
        }
        let _ = self.events.send(MembershipEvent::Deregistered {
            capability: capability.to_string(),
            service_id: service_id.to_string(),
        });
    }

    pub fn set_alive(&self, capability: &str, service_id: &str, alive: bool) {
        if let Some(mut entry) = self.services.get_mut(capability) {
            for endpoint in entry.iter_mut().filter(|e| e.service_id == service_id) {
                endpoint.alive = alive;
                endpoint.refreshed_at = Utc::now();
            }
        }
        let _ = self.events.send(MembershipEvent::AvailabilityChanged {
            capability: capability.to_string(),
            service_id: service_id.to_string(),
            alive,
        });
    }

    /// Simulate the backend going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every lookup by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    async fn simulate(&self) -> RegistryResult<()> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(RegistryError::backend("discovery backend unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DiscoveryBackend for InMemoryDiscovery {
    async fn lookup(&self, capability: &str) -> RegistryResult<Vec<ServiceEndpoint>> {
        self.simulate().await?;
        Ok(self
            .services
            .get(capability)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn catalog(&self) -> RegistryResult<HashMap<String, Vec<ServiceEndpoint>>> {
        self.simulate().await?;
        Ok(self
            .services
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
