use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

/// Ingestion progress marker for one source.
///
/// `last_seen` holds the external identifier of the newest record loaded
/// from that source. It only ever advances.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestionWatermark {
    pub source: String,
    pub last_seen: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionWatermark {
    /// Read the watermark value for a source, if any.
    pub async fn get(source: &str, pool: &PgPool) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT last_seen FROM ingestion_watermarks WHERE source = $1")
                .bind(source)
                .fetch_optional(pool)
                .await?;
        Ok(row.and_then(|(last_seen,)| last_seen))
    }

    /// Read and row-lock the watermark inside a load transaction.
    ///
    /// Serializes concurrent loads for the same source: a second loader
    /// blocks here until the first commits, so it observes the advanced
    /// value rather than a stale one. `FOR UPDATE` on an absent row locks
    /// nothing, so the row is materialized first; before any load has
    /// committed, the unique-index conflict on that insert is what makes
    /// two first loads queue up instead of both reading an empty mark.
    pub async fn get_locked(
        source: &str,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Option<String>> {
        sqlx::query(
            "INSERT INTO ingestion_watermarks (source, last_seen) VALUES ($1, NULL) \
             ON CONFLICT (source) DO NOTHING",
        )
        .bind(source)
        .execute(&mut **tx)
        .await?;

        let row: (Option<String>,) = sqlx::query_as(
            "SELECT last_seen FROM ingestion_watermarks WHERE source = $1 FOR UPDATE",
        )
        .bind(source)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.0)
    }

    /// Advance the watermark for a source within a load transaction.
    ///
    /// The caller is responsible for only passing a value at least as
    /// recent as the current one (the loader compares entry ids before
    /// calling this).
    pub async fn advance(
        source: &str,
        last_seen: &str,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ingestion_watermarks (source, last_seen, updated_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (source) DO UPDATE \
             SET last_seen = EXCLUDED.last_seen, updated_at = now()",
        )
        .bind(source)
        .bind(last_seen)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
