//! Transactional loader for extracted records.
//!
//! One call, one transaction: row-lock the source's watermark, insert the
//! batch with conflict-safe dedup, advance the watermark to the newest
//! entry id present in the batch, commit. A storage fault anywhere aborts
//! the whole unit, so the watermark never advances without its rows.

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info};

use super::applicant::{ApplicantRecord, EntryId};
use super::watermark::IngestionWatermark;

/// Result of one load: net-new rows inserted and the watermark value the
/// transaction left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub inserted: u64,
    pub watermark: Option<String>,
}

/// Insert a batch of records for `source` and advance its watermark.
///
/// Records whose URL already exists are skipped (existing row wins, no
/// update), so redelivering the same scrape task is safe. Returns the
/// number of net-new rows.
pub async fn load(pool: &PgPool, source: &str, records: &[ApplicantRecord]) -> Result<LoadSummary> {
    let mut tx = pool.begin().await?;

    let current = IngestionWatermark::get_locked(source, &mut tx).await?;
    let current_id = current.as_deref().and_then(EntryId::from_watermark);

    let mut inserted = 0u64;
    for record in records {
        let result = sqlx::query(
            "INSERT INTO applicants \
             (program, university, degree, status, term, us_or_international, \
              comments, decision_date, date_added, url, \
              gpa, gre, gre_v, gre_aw, llm_generated_program, llm_generated_university) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(&record.program)
        .bind(&record.university)
        .bind(&record.degree)
        .bind(&record.status)
        .bind(&record.term)
        .bind(&record.us_or_international)
        .bind(&record.comments)
        .bind(&record.decision_date)
        .bind(&record.date_added)
        .bind(&record.url)
        .bind(record.gpa)
        .bind(record.gre)
        .bind(record.gre_v)
        .bind(record.gre_aw)
        .bind(&record.llm_generated_program)
        .bind(&record.llm_generated_university)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    // Newest id present in the input batch, not the newest overall: a
    // partial crawl must not claim records it never extracted.
    let newest = records.iter().filter_map(ApplicantRecord::entry_id).max();
    let watermark = match (newest, current_id) {
        (Some(new), current) if current.map_or(true, |c| new > c) => {
            IngestionWatermark::advance(source, &new.to_string(), &mut tx).await?;
            Some(new.to_string())
        }
        _ => current,
    };

    tx.commit().await?;

    if inserted > 0 {
        info!(
            source = source,
            inserted,
            skipped = records.len() as u64 - inserted,
            watermark = watermark.as_deref().unwrap_or("-"),
            "loaded records"
        );
    } else {
        debug!(source = source, batch = records.len(), "no new records to insert");
    }

    Ok(LoadSummary { inserted, watermark })
}
