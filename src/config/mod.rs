//! # Orquestador Configuration
//!
//! Layered configuration: serde defaults, then an optional TOML file, then
//! `ORQUESTADOR_<SECTION>__<KEY>` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orquestador::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let backoff = &manager.config().backoff;
//! println!("base delay: {:?}", backoff.base_delay());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::topics::DEFAULT_TRIGGER_TOPIC;
use crate::models::WorkflowDefinition;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrquestadorConfig {
    pub engine: EngineConfig,
    pub backoff: BackoffConfig,
    pub registry: RegistryConfig,
    pub transport: TransportConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub triggers: TriggersConfig,
    /// Workflow definitions registered at bootstrap
    pub definitions: Vec<WorkflowDefinition>,
}

/// Orchestration engine behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra publish attempts after the first failure
    pub publish_retries: u32,
    /// Delay before the first publish retry; later retries grow by the multiplier
    pub publish_retry_delay_ms: u64,
    pub publish_retry_multiplier: f64,
    pub publish_retry_max_delay_ms: u64,
    /// Wait before re-dispatching an instance whose dispatch hit a store error
    pub dispatch_recovery_delay_ms: u64,
    /// Reload-and-retry bound on version conflicts
    pub max_cas_retries: u32,
    /// Competing result consumers per capability topic
    pub result_consumers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            publish_retries: 3,
            publish_retry_delay_ms: 50,
            publish_retry_multiplier: 2.0,
            publish_retry_max_delay_ms: 1_000,
            dispatch_recovery_delay_ms: 250,
            max_cas_retries: 5,
            result_consumers: 1,
        }
    }
}

impl EngineConfig {
    /// Delay before publish retry number `retry` (1-based), capped
    pub fn publish_retry_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let delay = self.publish_retry_delay_ms as f64 * self.publish_retry_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.publish_retry_max_delay_ms as f64) as u64)
    }

    pub fn dispatch_recovery_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_recovery_delay_ms)
    }
}

/// Step retry and registry backoff policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_enabled: bool,
    /// Upper bound of jitter as a fraction of the computed delay
    pub jitter_max_percentage: f64,
    pub registry_base_delay_ms: u64,
    pub registry_max_delay_ms: u64,
    pub max_registry_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_enabled: true,
            jitter_max_percentage: 0.1,
            registry_base_delay_ms: 500,
            registry_max_delay_ms: 10_000,
            max_registry_retries: 5,
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn registry_base_delay(&self) -> Duration {
        Duration::from_millis(self.registry_base_delay_ms)
    }

    pub fn registry_max_delay(&self) -> Duration {
        Duration::from_millis(self.registry_max_delay_ms)
    }
}

/// A fixed endpoint loaded into the static discovery backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaticServiceConfig {
    pub capability: String,
    pub service_id: String,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub cache_ttl_ms: u64,
    /// Oldest cache entry that may be served while the backend is failing
    pub staleness_bound_ms: u64,
    pub resolve_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub static_services: Vec<StaticServiceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5_000,
            staleness_bound_ms: 30_000,
            resolve_timeout_ms: 1_000,
            poll_interval_ms: 10_000,
            static_services: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn staleness_bound(&self) -> Duration {
        Duration::from_millis(self.staleness_bound_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub redelivery_delay_ms: u64,
    /// Deliveries before a message is dead-lettered
    pub max_deliveries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            redelivery_delay_ms: 100,
            max_deliveries: 5,
        }
    }
}

impl TransportConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            database_url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence when set
    pub level: Option<String>,
    pub format: LogFormat,
}

/// Maps an inbound event type to the workflow it starts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TriggerRoute {
    pub event_type: String,
    /// `name@version`
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TriggersConfig {
    pub enabled: bool,
    pub topic: String,
    pub routes: Vec<TriggerRoute>,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: DEFAULT_TRIGGER_TOPIC.to_string(),
            routes: Vec::new(),
        }
    }
}

impl OrquestadorConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        let backoff = &self.backoff;
        if backoff.multiplier.is_nan() || backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                backoff.multiplier.to_string(),
                "multiplier must be >= 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&backoff.jitter_max_percentage) {
            return Err(ConfigurationError::invalid_value(
                "backoff.jitter_max_percentage",
                backoff.jitter_max_percentage.to_string(),
                "jitter must be between 0.0 and 1.0",
            ));
        }
        if backoff.max_delay_ms < backoff.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_ms",
                backoff.max_delay_ms.to_string(),
                "max delay must not be below the base delay",
            ));
        }

        if self.registry.staleness_bound_ms < self.registry.cache_ttl_ms {
            return Err(ConfigurationError::invalid_value(
                "registry.staleness_bound_ms",
                self.registry.staleness_bound_ms.to_string(),
                "staleness bound must be >= cache_ttl_ms",
            ));
        }
        if self.registry.resolve_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "registry.resolve_timeout_ms",
                "0",
                "resolve timeout must be greater than 0",
            ));
        }

        if self.transport.max_deliveries == 0 {
            return Err(ConfigurationError::invalid_value(
                "transport.max_deliveries",
                "0",
                "max deliveries must be greater than 0",
            ));
        }

        let engine = &self.engine;
        if engine.publish_retry_multiplier.is_nan() || engine.publish_retry_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "engine.publish_retry_multiplier",
                engine.publish_retry_multiplier.to_string(),
                "multiplier must be >= 1.0",
            ));
        }
        if engine.publish_retry_max_delay_ms < engine.publish_retry_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "engine.publish_retry_max_delay_ms",
                engine.publish_retry_max_delay_ms.to_string(),
                "max delay must not be below the publish retry delay",
            ));
        }
        if engine.dispatch_recovery_delay_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.dispatch_recovery_delay_ms",
                "0",
                "dispatch recovery delay must be greater than 0",
            ));
        }

        if self.engine.result_consumers == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.result_consumers",
                "0",
                "at least one result consumer is required",
            ));
        }

        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigurationError::missing_required_field(
                "store.database_url",
                "postgres store configuration",
            ));
        }

        if self.triggers.enabled && self.triggers.topic.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "triggers.topic",
                "trigger configuration",
            ));
        }

        for definition in &self.definitions {
            definition.validate().map_err(|reason| {
                ConfigurationError::validation_error(format!(
                    "definition {}@{}: {reason}",
                    definition.name, definition.version
                ))
            })?;
        }

        Ok(())
    }
}
