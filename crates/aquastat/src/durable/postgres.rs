use super::{DurableStore, RecordStatus};
use crate::error::{Result, StatError};
use crate::snapshot::MetricsSnapshot;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

/// Postgres-backed durable store
#[derive(Debug, Clone)]
pub struct PostgresDurableStore {
    pool: Pool<Postgres>,
    table_name: String,
}

impl PostgresDurableStore {
    pub fn new(pool: Pool<Postgres>, table_name: &str) -> Self {
        Self {
            pool,
            table_name: table_name.to_string(),
        }
    }

    /// Connect to `url` and use `table_name`.
    pub async fn connect(url: &str, table_name: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StatError::ConfigError(e.to_string()))?;
        Ok(Self::new(pool, table_name))
    }

    /// Initialize the database schema
    pub async fn ensure_schema(&self) -> Result<()> {
        let table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                key TEXT NOT NULL,
                request BIGINT NOT NULL DEFAULT 0,
                uniq_agent BIGINT NOT NULL DEFAULT 0,
                num_success BIGINT NOT NULL DEFAULT 0,
                num_error BIGINT NOT NULL DEFAULT 0,
                status INT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            self.table_name
        );
        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_key_status ON {} (key, status)",
            self.table_name, self.table_name
        );

        for query in [table, index] {
            sqlx::query(&query)
                .execute(&self.pool)
                .await
                .map_err(|e| StatError::BackendError(e.to_string()))?;
        }

        Ok(())
    }
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    async fn get_active_record(&self, key: &str) -> Result<MetricsSnapshot> {
        let query = format!(
            r#"
            SELECT request, uniq_agent, num_success, num_error
            FROM {}
            WHERE key = $1 AND status = $2 AND deleted_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
            self.table_name
        );

        let row = sqlx::query(&query)
            .bind(key)
            .bind(RecordStatus::Active.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        match row {
            Some(row) => Ok(MetricsSnapshot {
                request: from_db(row.get("request")),
                unique_agents: from_db(row.get("uniq_agent")),
                success: from_db(row.get("num_success")),
                error: from_db(row.get("num_error")),
            }),
            None => Err(StatError::NotFound(key.to_string())),
        }
    }

    async fn replace_active_record(&self, key: &str, snapshot: MetricsSnapshot) -> Result<()> {
        let deactivate = format!(
            r#"
            UPDATE {}
            SET status = $1, updated_at = NOW()
            WHERE key = $2 AND status = $3 AND deleted_at IS NULL
            "#,
            self.table_name
        );
        let insert = format!(
            r#"
            INSERT INTO {} (key, request, uniq_agent, num_success, num_error, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            "#,
            self.table_name
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        // Zero affected rows is fine: first backup of this key
        sqlx::query(&deactivate)
            .bind(RecordStatus::Inactive.value())
            .bind(key)
            .bind(RecordStatus::Active.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        sqlx::query(&insert)
            .bind(key)
            .bind(to_db(snapshot.request))
            .bind(to_db(snapshot.unique_agents))
            .bind(to_db(snapshot.success))
            .bind(to_db(snapshot.error))
            .bind(RecordStatus::Active.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StatError::BackendError(e.to_string()))?;

        Ok(())
    }
}
