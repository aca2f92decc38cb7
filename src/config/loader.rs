//! Configuration Loader
//!
//! Merges serde defaults, an optional TOML file and `ORQUESTADOR_*` environment
//! overrides with the `config` crate, then validates the result.

use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::OrquestadorConfig;
use crate::constants::system::{CONFIG_ENV_PREFIX, CONFIG_PATH_ENV_VAR, DEFAULT_CONFIG_PATH, ENV_VAR};

/// Loaded, validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: OrquestadorConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    ///
    /// Uses `ORQUESTADOR_CONFIG` when set (the file must then exist), otherwise
    /// `config/orquestador.toml` if present.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        match env::var(CONFIG_PATH_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_file(path),
            _ => Self::build(Some(PathBuf::from(DEFAULT_CONFIG_PATH)), false, None, CONFIG_ENV_PREFIX),
        }
    }

    /// Load configuration from a specific file; the file is required
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound { path });
        }
        Self::build(Some(path), true, None, CONFIG_ENV_PREFIX)
    }

    /// Load from inline TOML without environment overrides
    pub fn load_from_str(toml: &str) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(None, false, Some(toml), "")
    }

    /// Load a file with overrides read from a custom environment prefix
    pub fn load_with_env_prefix(
        path: Option<PathBuf>,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path, false, None, env_prefix)
    }

    fn build(
        path: Option<PathBuf>,
        required: bool,
        inline: Option<&str>,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let mut builder = Config::builder();

        let source_path = match &path {
            Some(p) if p.is_file() => Some(p.clone()),
            _ => None,
        };

        if let Some(path) = &path {
            debug!(path = %path.display(), required, "Adding configuration file source");
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }

        if let Some(inline) = inline {
            builder = builder.add_source(File::from_str(inline, FileFormat::Toml));
        }

        if !env_prefix.is_empty() {
            builder = builder.add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: OrquestadorConfig = builder
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(
                    source_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "defaults".to_string()),
                    e,
                )
            })?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            source = %source_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
            store = ?config.store.backend,
            definitions = config.definitions.len(),
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_path,
        }))
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: OrquestadorConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        }))
    }

    pub fn config(&self) -> &OrquestadorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Deployment environment from `ORQUESTADOR_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        env::var(ENV_VAR)
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, StoreBackend};
    use std::io::Write;

    const SAMPLE: &str = r#"
[engine]
publish_retries = 1

[backoff]
base_delay_ms = 10
max_delay_ms = 100

[logging]
format = "json"

[[registry.static_services]]
capability = "email"
service_id = "email-1"
address = "127.0.0.1"
port = 2525

[[definitions]]
name = "welcome"
version = "1"

[[definitions.steps]]
name = "send_email"
capability = "email"
max_retries = 2
"#;

    #[test]
    fn test_load_from_str_merges_defaults() {
        let manager = ConfigManager::load_from_str(SAMPLE).unwrap();
        let config = manager.config();

        assert_eq!(config.engine.publish_retries, 1);
        assert_eq!(config.engine.max_cas_retries, 5);
        assert_eq!(config.backoff.base_delay_ms, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.registry.static_services[0].port, 2525);
        assert_eq!(config.definitions[0].steps[0].max_retries, 2);
        assert_eq!(config.definitions[0].steps[0].timeout_ms, 30_000);
    }

    #[test]
    fn test_load_from_file_and_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        std::env::set_var("ORQ_LOADER_TEST_ENGINE__PUBLISH_RETRIES", "7");
        std::env::set_var("ORQ_LOADER_TEST_STORE__BACKEND", "in_memory");
        let manager = ConfigManager::load_with_env_prefix(
            Some(file.path().to_path_buf()),
            "ORQ_LOADER_TEST",
        )
        .unwrap();
        std::env::remove_var("ORQ_LOADER_TEST_ENGINE__PUBLISH_RETRIES");
        std::env::remove_var("ORQ_LOADER_TEST_STORE__BACKEND");

        assert_eq!(manager.config().engine.publish_retries, 7);
        assert_eq!(manager.config().store.backend, StoreBackend::InMemory);
        assert_eq!(manager.source_path(), Some(file.path()));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigManager::load_from_file("/nonexistent/orquestador.toml").unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let err = ConfigManager::load_from_str("[transport]\nmax_deliveries = 0\n").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
