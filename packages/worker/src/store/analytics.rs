//! Precomputed analytics snapshot over the applicant store.
//!
//! The snapshot is a single-row table rebuilt on demand. Refresh runs as
//! plain DML inside one transaction: take an advisory lock, delete the old
//! row, insert the recomputed one. Concurrent refreshes serialize on the
//! lock; readers never block and observe either the pre- or post-refresh
//! snapshot, never a torn one.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

/// Advisory lock key serializing snapshot refreshes.
const REFRESH_LOCK_KEY: i64 = 0x6772_6164_7374_6174; // "gradstat"

/// One recomputed analytics snapshot.
///
/// Averages and percentages are NULL on an empty store; the refresh query
/// guards every ratio with NULLIF so an empty store never divides by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalyticsSummary {
    pub total_records: i64,
    /// Entries for the Fall 2025 term
    pub fall_2025_count: i64,
    /// Percent of applicants who are neither American nor Other
    pub international_pct: Option<f64>,
    pub avg_gpa: Option<f64>,
    pub avg_gre: Option<f64>,
    pub avg_gre_v: Option<f64>,
    pub avg_gre_aw: Option<f64>,
    /// Average GPA of American applicants for Fall 2025
    pub avg_gpa_american_fall_2025: Option<f64>,
    /// Acceptance rate among Fall 2025 entries
    pub fall_2025_acceptance_pct: Option<f64>,
    /// Average GPA of accepted Fall 2025 applicants
    pub avg_gpa_accepted_fall_2025: Option<f64>,
    /// JHU Masters in Computer Science entries
    pub jhu_masters_cs_count: i64,
    /// Georgetown/MIT/Stanford/CMU PhD CS acceptances in 2025, matched on
    /// the raw extracted fields
    pub target_phd_cs_accept_count: i64,
    /// Same cohort matched on the enrichment-normalized fields, kept
    /// separately to compare extraction quality
    pub target_phd_cs_accept_count_llm: i64,
    pub computed_at: DateTime<Utc>,
}

const REFRESH_SQL: &str = "\
    INSERT INTO analytics_summary ( \
        total_records, fall_2025_count, international_pct, \
        avg_gpa, avg_gre, avg_gre_v, avg_gre_aw, \
        avg_gpa_american_fall_2025, fall_2025_acceptance_pct, \
        avg_gpa_accepted_fall_2025, jhu_masters_cs_count, \
        target_phd_cs_accept_count, target_phd_cs_accept_count_llm, computed_at) \
    SELECT \
        COUNT(*), \
        COUNT(*) FILTER (WHERE term = 'Fall 2025'), \
        ROUND((COUNT(*) FILTER (WHERE us_or_international NOT IN ('American', 'Other')) * 100.0) \
            / NULLIF(COUNT(*), 0), 2)::float8, \
        AVG(gpa), \
        AVG(gre), \
        AVG(gre_v), \
        AVG(gre_aw), \
        AVG(gpa) FILTER (WHERE us_or_international = 'American' AND term = 'Fall 2025'), \
        ROUND((COUNT(*) FILTER (WHERE status ILIKE '%Accepted%' AND term = 'Fall 2025') * 100.0) \
            / NULLIF(COUNT(*) FILTER (WHERE term = 'Fall 2025'), 0), 2)::float8, \
        AVG(gpa) FILTER (WHERE term = 'Fall 2025' AND status ILIKE '%Accepted%'), \
        COUNT(*) FILTER (WHERE \
            (university ILIKE '%Johns Hopkins%' OR university ILIKE '%JHU%') \
            AND (program ILIKE '%Computer Science%' OR llm_generated_program ILIKE '%Computer Science%') \
            AND degree ILIKE '%Masters%'), \
        COUNT(*) FILTER (WHERE term LIKE '%2025%' AND status ILIKE '%Accepted%' \
            AND (university ILIKE '%Georgetown%' OR university ILIKE '%MIT%' \
                 OR university ILIKE '%Stanford%' OR university ILIKE '%Carnegie Mellon%') \
            AND program ILIKE '%Computer Science%' AND degree ILIKE '%PhD%'), \
        COUNT(*) FILTER (WHERE term LIKE '%2025%' AND status ILIKE '%Accepted%' \
            AND llm_generated_university IN ('Georgetown University', \
                'Massachusetts Institute of Technology', 'Stanford University', \
                'Carnegie Mellon University') \
            AND llm_generated_program ILIKE '%Computer Science%' AND degree ILIKE '%PhD%'), \
        now() \
    FROM applicants";

impl AnalyticsSummary {
    /// Recompute the snapshot from current store contents.
    pub async fn refresh(pool: &PgPool) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REFRESH_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM analytics_summary")
            .execute(&mut *tx)
            .await?;
        sqlx::query(REFRESH_SQL).execute(&mut *tx).await?;

        tx.commit().await?;
        info!("analytics snapshot refreshed");
        Ok(())
    }

    /// Read the current snapshot, if one has been computed.
    pub async fn fetch(pool: &PgPool) -> Result<Option<Self>> {
        let summary =
            sqlx::query_as::<_, AnalyticsSummary>("SELECT * FROM analytics_summary LIMIT 1")
                .fetch_optional(pool)
                .await?;
        Ok(summary)
    }
}
