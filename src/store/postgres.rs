//! PostgreSQL-backed state store.
//!
//! Instances are kept as a JSONB document next to the indexed columns the store
//! queries on (`status`, `version`). Compare-and-swap is a conditional
//! `UPDATE ... WHERE version = $n`; zero affected rows means another writer won.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{StoreError, StoreResult, WorkflowStateStore};
use crate::models::WorkflowInstance;
use crate::state_machine::WorkflowStatus;

pub const INSTANCES_TABLE: &str = "orquestador_workflow_instances";

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS orquestador_workflow_instances (
    instance_id UUID PRIMARY KEY,
    definition_name TEXT NOT NULL,
    definition_version TEXT NOT NULL,
    status TEXT NOT NULL,
    version BIGINT NOT NULL,
    document JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)"#;

const CREATE_STATUS_INDEX_SQL: &str = "CREATE INDEX IF NOT EXISTS idx_orquestador_instances_status \
     ON orquestador_workflow_instances (status)";

#[derive(Debug, Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_pool_size(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the instances table and index when missing
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_STATUS_INDEX_SQL)
            .execute(&self.pool)
            .await?;
        info!(table = INSTANCES_TABLE, "🗄️ State store schema ready");
        Ok(())
    }

    fn decode(row: &sqlx::postgres::PgRow) -> StoreResult<WorkflowInstance> {
        let instance_id: Uuid = row.get("instance_id");
        let version: i64 = row.get("version");
        let document: serde_json::Value = row.get("document");

        let mut instance: WorkflowInstance = serde_json::from_value(document)?;
        if instance.instance_id != instance_id {
            return Err(StoreError::Corrupt {
                instance_id,
                reason: format!("document carries instance id {}", instance.instance_id),
            });
        }
        instance.version = u64::try_from(version).map_err(|_| StoreError::Corrupt {
            instance_id,
            reason: format!("negative version {version}"),
        })?;
        Ok(instance)
    }
}

fn to_db_version(instance_id: Uuid, version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt {
        instance_id,
        reason: format!("version {version} exceeds BIGINT"),
    })
}

#[async_trait]
impl WorkflowStateStore for PostgresStateStore {
    #[instrument(skip(self, instance), fields(instance_id = %instance.instance_id, version = instance.version))]
    async fn save(&self, instance: &WorkflowInstance) -> StoreResult<u64> {
        let new_version = instance.version + 1;
        let mut stored = instance.clone();
        stored.version = new_version;
        let document = serde_json::to_value(&stored)?;

        let result = if instance.version == 0 {
            sqlx::query(
                "INSERT INTO orquestador_workflow_instances \
                 (instance_id, definition_name, definition_version, status, version, document, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (instance_id) DO NOTHING",
            )
            .bind(instance.instance_id)
            .bind(&instance.definition.name)
            .bind(&instance.definition.version)
            .bind(instance.status.as_str())
            .bind(to_db_version(instance.instance_id, new_version)?)
            .bind(document)
            .bind(instance.created_at)
            .bind(instance.updated_at)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE orquestador_workflow_instances \
                 SET status = $2, version = $3, document = $4, updated_at = $5 \
                 WHERE instance_id = $1 AND version = $6",
            )
            .bind(instance.instance_id)
            .bind(instance.status.as_str())
            .bind(to_db_version(instance.instance_id, new_version)?)
            .bind(document)
            .bind(instance.updated_at)
            .bind(to_db_version(instance.instance_id, instance.version)?)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            debug!("CAS conflict on save");
            return Err(StoreError::conflict(instance.instance_id, instance.version));
        }

        Ok(new_version)
    }

    async fn load(&self, instance_id: Uuid) -> StoreResult<Option<WorkflowInstance>> {
        let row = sqlx::query(
            "SELECT instance_id, version, document FROM orquestador_workflow_instances \
             WHERE instance_id = $1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_by_status(&self, status: WorkflowStatus) -> StoreResult<Vec<WorkflowInstance>> {
        let rows = sqlx::query(
            "SELECT instance_id, version, document FROM orquestador_workflow_instances \
             WHERE status = $1 ORDER BY created_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, u64>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS total FROM orquestador_workflow_instances GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let raw: String = row.get("status");
            let total: i64 = row.get("total");
            match raw.parse::<WorkflowStatus>() {
                Ok(status) => {
                    counts.insert(status, total.max(0) as u64);
                }
                Err(e) => debug!(error = %e, "Skipping unknown status in count"),
            }
        }
        Ok(counts)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
