//! Storage layer: applicant records, watermarks, and the analytics snapshot.
//!
//! The pipeline talks to storage through the `IngestStore` trait so the
//! dispatch logic stays testable without a database; `PgStore` is the
//! PostgreSQL implementation backed by the models in this module.

pub mod analytics;
pub mod applicant;
pub mod loader;
pub mod watermark;

pub use analytics::AnalyticsSummary;
pub use applicant::{ApplicantRecord, EntryId};
pub use loader::LoadSummary;
pub use watermark::IngestionWatermark;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Storage operations the pipeline needs.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Current watermark value for a source, if any.
    async fn watermark(&self, source: &str) -> Result<Option<String>>;

    /// Transactionally insert a batch and advance the source's watermark.
    async fn load(&self, source: &str, records: &[ApplicantRecord]) -> Result<LoadSummary>;

    /// Recompute the analytics snapshot from current store contents.
    async fn refresh_analytics(&self) -> Result<()>;
}

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IngestStore for PgStore {
    async fn watermark(&self, source: &str) -> Result<Option<String>> {
        IngestionWatermark::get(source, &self.pool).await
    }

    async fn load(&self, source: &str, records: &[ApplicantRecord]) -> Result<LoadSummary> {
        loader::load(&self.pool, source, records).await
    }

    async fn refresh_analytics(&self) -> Result<()> {
        AnalyticsSummary::refresh(&self.pool).await
    }
}
