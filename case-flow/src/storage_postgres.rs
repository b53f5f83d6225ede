use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::{
    error::{GraphError, Result},
    state::GraphState,
    storage::{Session, SessionStorage},
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS case_sessions (
    id TEXT PRIMARY KEY,
    graph_id TEXT NOT NULL,
    data JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)"#;

/// PostgreSQL-backed session storage. The whole session, state included, is
/// kept as one JSONB document per row.
pub struct PostgresSessionStorage {
    pool: PgPool,
    ttl: Option<Duration>,
}

impl PostgresSessionStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(storage_error)?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(storage_error)?;

        info!("Connected to PostgreSQL session storage");
        Ok(Self { pool, ttl: None })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn cutoff(&self) -> Option<chrono::DateTime<Utc>> {
        self.ttl.map(|ttl| Utc::now() - ttl)
    }
}

fn storage_error(e: impl std::fmt::Display) -> GraphError {
    GraphError::StorageError(e.to_string())
}

#[async_trait]
impl<S: GraphState> SessionStorage<S> for PostgresSessionStorage {
    async fn save(&self, session: Session<S>) -> Result<()> {
        let data = serde_json::to_value(&session).map_err(storage_error)?;
        sqlx::query(
            "INSERT INTO case_sessions (id, graph_id, data, updated_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET graph_id = EXCLUDED.graph_id, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
        )
        .bind(&session.id)
        .bind(&session.graph_id)
        .bind(data)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session<S>>> {
        let row: Option<Value> = sqlx::query_scalar(
            "SELECT data FROM case_sessions
             WHERE id = $1 AND ($2::timestamptz IS NULL OR updated_at > $2)",
        )
        .bind(id)
        .bind(self.cutoff())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|data| serde_json::from_value(data).map_err(storage_error))
            .transpose()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM case_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize> {
        let Some(cutoff) = self.cutoff() else {
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM case_sessions WHERE updated_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() as usize)
    }
}
