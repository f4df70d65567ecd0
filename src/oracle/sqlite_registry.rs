//! SQLite implementation of the known-entity storage.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use tracing::{debug, info};

use crate::oracle::storage::KnownEntityStorage;
use crate::oracle::types::KnownEntityRecord;
use crate::types::Verdict;

#[derive(FromRow)]
struct KnownEntityRow {
    identity: String,
    first_token: String,
    verdict: String,
    reason: String,
    flagged_at: i64,
    detection_count: i64,
}

impl TryFrom<KnownEntityRow> for KnownEntityRecord {
    type Error = anyhow::Error;

    fn try_from(row: KnownEntityRow) -> Result<Self> {
        let verdict = Verdict::from_label(&row.verdict)
            .ok_or_else(|| anyhow!("Unknown verdict {:?} for {}", row.verdict, row.identity))?;
        let flagged_at = Utc
            .timestamp_millis_opt(row.flagged_at)
            .single()
            .ok_or_else(|| anyhow!("Invalid flagged_at {} for {}", row.flagged_at, row.identity))?;

        Ok(KnownEntityRecord {
            identity: row.identity,
            first_token: row.first_token,
            verdict,
            reason: row.reason,
            flagged_at,
            detection_count: row.detection_count.max(0) as u64,
        })
    }
}

/// Durable registry of flagged creator identities.
pub struct SqliteEntityStorage {
    pool: Pool<Sqlite>,
}

impl SqliteEntityStorage {
    /// Connect to `database_url` (e.g. `sqlite:./known_entities.db?mode=rwc`)
    /// and create the schema if needed.
    pub async fn connect(database_url: &str) -> Result<Self> {
        // An in-memory database only lives as long as its single connection
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to registry database {database_url}"))?;

        Self::create_schema(&pool).await?;

        info!("Known-entity registry connected to {}", database_url);
        Ok(Self { pool })
    }

    async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS known_entities (
                identity TEXT PRIMARY KEY,
                first_token TEXT NOT NULL,
                verdict TEXT NOT NULL,
                reason TEXT NOT NULL,
                flagged_at INTEGER NOT NULL,
                detection_count INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create known_entities table")?;

        Ok(())
    }
}

#[async_trait]
impl KnownEntityStorage for SqliteEntityStorage {
    async fn lookup_and_count(&self, identity: &str) -> Result<Option<KnownEntityRecord>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE known_entities SET detection_count = detection_count + 1 WHERE identity = ?",
        )
        .bind(identity)
        .execute(&mut *tx)
        .await
        .context("Failed to increment detection count")?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row: KnownEntityRow = sqlx::query_as("SELECT * FROM known_entities WHERE identity = ?")
            .bind(identity)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to read known entity")?;

        tx.commit().await?;
        debug!("Known entity {} matched ({} detections)", identity, row.detection_count);
        Ok(Some(row.try_into()?))
    }

    async fn insert_if_absent(&self, record: &KnownEntityRecord) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO known_entities
                (identity, first_token, verdict, reason, flagged_at, detection_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.identity)
        .bind(&record.first_token)
        .bind(record.verdict.as_str())
        .bind(&record.reason)
        .bind(record.flagged_at.timestamp_millis())
        .bind(record.detection_count as i64)
        .execute(&self.pool)
        .await
        .context("Failed to insert known entity")?
        .rows_affected();

        Ok(inserted > 0)
    }

    async fn get(&self, identity: &str) -> Result<Option<KnownEntityRecord>> {
        let row: Option<KnownEntityRow> =
            sqlx::query_as("SELECT * FROM known_entities WHERE identity = ?")
                .bind(identity)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read known entity")?;

        row.map(KnownEntityRecord::try_from).transpose()
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM known_entities")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count known entities")?;
        Ok(count)
    }

    async fn health_check(&self) -> Result<bool> {
        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }
}
