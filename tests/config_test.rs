//! The shipped configuration file loads and bootstraps.

use orquestador::config::{ConfigManager, StoreBackend};
use orquestador::models::DefinitionRef;
use orquestador::orchestration::{BootstrapOptions, OrchestrationBootstrap};

const SHIPPED_CONFIG: &str = "config/orquestador.toml";

#[test]
fn test_shipped_config_is_valid() {
    let manager = ConfigManager::load_from_file(SHIPPED_CONFIG).unwrap();
    let config = manager.config();

    assert_eq!(config.store.backend, StoreBackend::InMemory);
    assert_eq!(config.registry.static_services.len(), 2);
    assert_eq!(config.definitions.len(), 4);
    assert_eq!(config.triggers.routes.len(), 4);
    assert!(manager.source_path().is_some());

    let capabilities: std::collections::BTreeSet<&str> = config
        .definitions
        .iter()
        .flat_map(|d| d.steps.iter().map(|s| s.capability.as_str()))
        .collect();
    assert_eq!(capabilities.into_iter().collect::<Vec<_>>(), vec!["email", "sms"]);
}

#[tokio::test]
async fn test_shipped_config_bootstraps() {
    let manager = ConfigManager::load_from_file(SHIPPED_CONFIG).unwrap();
    let system = OrchestrationBootstrap::bootstrap(manager, BootstrapOptions::default())
        .await
        .unwrap();

    let status = system.system_status().await;
    assert!(status.triggers_enabled);
    assert_eq!(status.definitions, 4);
    assert_eq!(status.result_topics.len(), 2);
    assert!(system
        .engine()
        .definitions()
        .contains(&DefinitionRef::new("password_reset", "1")));

    system.shutdown().await;
}
