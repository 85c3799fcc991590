use crate::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::WatchlistEntry;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row fetched from the `artifacts` table.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredArtifact {
    pub code: String,
    pub data: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// Read access to the artifacts written by the batch producer.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Every row stored under `code`. The primary key allows at most one; the
    /// caller decides what to make of anything else.
    async fn fetch_artifacts(&self, code: &str) -> Result<Vec<StoredArtifact>, DbError>;
}

/// The producer's side of the artifact table.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn ensure_artifact_table(&self) -> Result<(), DbError>;

    /// Replaces the artifact for `code` wholesale and returns the new
    /// `updated_at`. The payload must be a JSON object.
    async fn publish_artifact(&self, code: &str, data: &JsonValue)
    -> Result<DateTime<Utc>, DbError>;
}

/// The user-maintained watchlist.
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Creates the `watchlist` table if it does not exist yet.
    async fn ensure_watchlist_table(&self) -> Result<(), DbError>;

    /// All entries, most recently added first.
    async fn list_watchlist(&self) -> Result<Vec<WatchlistEntry>, DbError>;

    /// Inserts an entry unless the code is already present, in which case the
    /// existing row (and its name) is left alone. Returns whether a row was added.
    async fn add_watchlist_entry(&self, code: &str, name: Option<&str>) -> Result<bool, DbError>;

    /// Deletes the entry for `code`. Returns whether a row was removed.
    async fn remove_watchlist_entry(&self, code: &str) -> Result<bool, DbError>;
}

pub(crate) fn check_publishable(code: &str, data: &JsonValue) -> Result<(), DbError> {
    if code.trim().is_empty() {
        return Err(DbError::InvalidArtifact {
            code: code.to_string(),
            reason: "code must not be empty".to_string(),
        });
    }
    if !data.is_object() {
        return Err(DbError::InvalidArtifact {
            code: code.to_string(),
            reason: "payload must be a JSON object".to_string(),
        });
    }
    Ok(())
}

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// Timestamps are cast to `timestamptz` so tables created by older producers
// with plain `TIMESTAMP` columns still decode.
#[async_trait]
impl ArtifactStore for DbRepository {
    async fn fetch_artifacts(&self, code: &str) -> Result<Vec<StoredArtifact>, DbError> {
        let rows = sqlx::query_as::<_, StoredArtifact>(
            r#"
            SELECT code, data, updated_at::timestamptz AS updated_at
            FROM artifacts
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(code, rows = rows.len(), "Fetched artifact rows.");
        Ok(rows)
    }
}

#[async_trait]
impl ArtifactPublisher for DbRepository {
    async fn ensure_artifact_table(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                code VARCHAR(10) PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn publish_artifact(
        &self,
        code: &str,
        data: &JsonValue,
    ) -> Result<DateTime<Utc>, DbError> {
        check_publishable(code, data)?;
        let updated_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO artifacts (code, data, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (code) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            RETURNING updated_at::timestamptz
            "#,
        )
        .bind(code)
        .bind(Json(data))
        .fetch_one(&self.pool)
        .await?;
        tracing::debug!(code, %updated_at, "Artifact row upserted.");
        Ok(updated_at)
    }
}

#[async_trait]
impl WatchlistStore for DbRepository {
    async fn ensure_watchlist_table(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watchlist (
                code VARCHAR(10) PRIMARY KEY,
                name VARCHAR(50),
                added_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_watchlist(&self) -> Result<Vec<WatchlistEntry>, DbError> {
        let entries = sqlx::query_as::<_, WatchlistEntry>(
            "SELECT code, name, added_at::timestamptz AS added_at FROM watchlist ORDER BY added_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(entries = entries.len(), "Listed watchlist.");
        Ok(entries)
    }

    /// Uses `ON CONFLICT DO NOTHING` to be idempotent: a second add with a
    /// different name keeps the first one.
    async fn add_watchlist_entry(&self, code: &str, name: Option<&str>) -> Result<bool, DbError> {
        let result = sqlx::query(
            "INSERT INTO watchlist (code, name) VALUES ($1, $2) ON CONFLICT (code) DO NOTHING",
        )
        .bind(code)
        .bind(name)
        .execute(&self.pool)
        .await?;
        let added = result.rows_affected() == 1;
        if !added {
            tracing::debug!(code, "Watchlist already holds this code; name left unchanged.");
        }
        Ok(added)
    }

    async fn remove_watchlist_entry(&self, code: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM watchlist WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() > 0;
        if !removed {
            tracing::warn!(code, "Remove matched no watchlist entry.");
        }
        Ok(removed)
    }
}
