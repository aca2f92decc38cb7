//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orchestration core. Console output is
//! pretty by default or JSON when configured.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::{LogFormat, LoggingConfig};
use crate::constants::system::ENV_VAR;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with default settings
pub fn init_structured_logging() {
    init_with_config(&LoggingConfig::default());
}

/// Initialize structured logging from the `logging` configuration section
///
/// `RUST_LOG` wins over the configured level, which wins over the environment default.
pub fn init_with_config(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let directive = std::env::var("RUST_LOG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| config.level.clone())
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed(),
        };

        // A global subscriber may already be set by the embedding application or a test
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            filter = %directive,
            format = ?config.format,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var(ENV_VAR)
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" | "development" => "debug",
        _ => "debug",
    }
}

/// Log structured data for workflow instance operations
pub fn log_workflow_operation(
    operation: &str,
    instance_id: Option<Uuid>,
    definition: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    let instance_id = instance_id.map(|id| id.to_string());
    tracing::info!(
        operation = %operation,
        instance_id = instance_id.as_deref(),
        definition = definition,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 WORKFLOW_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    instance_id: Option<Uuid>,
    step_name: Option<&str>,
    attempt: Option<u32>,
    status: &str,
    details: Option<&str>,
) {
    let instance_id = instance_id.map(|id| id.to_string());
    tracing::info!(
        operation = %operation,
        instance_id = instance_id.as_deref(),
        step_name = step_name,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 STEP_OPERATION"
    );
}
