//! PostgreSQL state store tests.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a reachable database.

use serde_json::json;

use orquestador::models::{DefinitionRef, WorkflowInstance};
use orquestador::state_machine::{WorkflowEvent, WorkflowStatus};
use orquestador::store::{PostgresStateStore, WorkflowStateStore};

async fn store() -> Option<PostgresStateStore> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL store test");
        return None;
    };
    let store = PostgresStateStore::connect_with_pool_size(&url, 2)
        .await
        .expect("database reachable");
    store.ensure_schema().await.expect("schema created");
    Some(store)
}

#[tokio::test]
async fn test_postgres_save_load_and_version_check() {
    let Some(store) = store().await else {
        return;
    };

    let mut instance = WorkflowInstance::new(
        DefinitionRef::new("pg_roundtrip", "1"),
        json!({"user_id": 9}),
        Some("corr-pg".to_string()),
    );
    instance.version = store.save(&instance).await.unwrap();
    assert_eq!(instance.version, 1);

    // A second insert of the same id loses
    let mut duplicate = instance.clone();
    duplicate.version = 0;
    assert!(store.save(&duplicate).await.unwrap_err().is_conflict());

    let stale = instance.clone();
    instance.apply(WorkflowEvent::Dispatch).unwrap();
    instance.version = store.save(&instance).await.unwrap();
    assert_eq!(instance.version, 2);

    let err = store.save(&stale).await.unwrap_err();
    assert!(err.is_conflict());

    let loaded = store.load(instance.instance_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, WorkflowStatus::Running);
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.correlation_id, "corr-pg");
    assert_eq!(loaded.payload["user_id"], json!(9));
    assert_eq!(loaded.transitions.len(), 1);

    let running = store.list_by_status(WorkflowStatus::Running).await.unwrap();
    assert!(running.iter().any(|i| i.instance_id == instance.instance_id));

    let counts = store.count_by_status().await.unwrap();
    assert!(counts.get(&WorkflowStatus::Running).copied().unwrap_or(0) >= 1);
}

#[tokio::test]
async fn test_postgres_load_missing_instance() {
    let Some(store) = store().await else {
        return;
    };
    assert!(store.load(uuid::Uuid::new_v4()).await.unwrap().is_none());
}
