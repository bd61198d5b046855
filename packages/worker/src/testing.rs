//! In-memory test doubles.
//!
//! These mirror the contracts of the real implementations closely enough
//! to exercise the pipeline end to end without a database, a broker, or
//! the external site: `MemoryStore` keeps the loader's insert-if-absent
//! and advance-only watermark semantics, `StaticFetcher` serves canned
//! pages with optional injected failures, and `RecordingPublisher` tracks
//! what would have been enqueued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::broker::TaskPublisher;
use crate::common::FetchError;
use crate::scrape::PageFetcher;
use crate::store::{AnalyticsSummary, ApplicantRecord, EntryId, IngestStore, LoadSummary};
use crate::tasks::TaskMessage;

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory `IngestStore` keyed by record URL.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ApplicantRecord>>,
    watermarks: Mutex<HashMap<String, String>>,
    summary: Mutex<Option<AnalyticsSummary>>,
    fail_next_load: AtomicBool,
    fail_next_refresh: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn record(&self, url: &str) -> Option<ApplicantRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    pub fn watermark_value(&self, source: &str) -> Option<String> {
        self.watermarks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .cloned()
    }

    pub fn summary(&self) -> Option<AnalyticsSummary> {
        self.summary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Make the next `load` fail without mutating anything, simulating an
    /// aborted transaction.
    pub fn fail_next_load(&self) {
        self.fail_next_load.store(true, Ordering::SeqCst);
    }

    /// Make the next `refresh_analytics` fail, leaving the previous
    /// snapshot in place.
    pub fn fail_next_refresh(&self) {
        self.fail_next_refresh.store(true, Ordering::SeqCst);
    }

    fn compute_summary(records: &HashMap<String, ApplicantRecord>) -> AnalyticsSummary {
        fn contains(field: &Option<String>, needle: &str) -> bool {
            field
                .as_deref()
                .map(|v| v.to_lowercase().contains(needle))
                .unwrap_or(false)
        }
        fn is_fall_2025(r: &ApplicantRecord) -> bool {
            r.term.as_deref() == Some("Fall 2025")
        }
        fn accepted(r: &ApplicantRecord) -> bool {
            contains(&r.status, "accepted")
        }
        fn avg(values: Vec<f64>) -> Option<f64> {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        fn round2(v: f64) -> f64 {
            (v * 100.0).round() / 100.0
        }

        let total = records.len() as i64;
        let fall_2025: Vec<&ApplicantRecord> =
            records.values().filter(|r| is_fall_2025(r)).collect();
        let international = records
            .values()
            .filter(|r| {
                !matches!(
                    r.us_or_international.as_deref(),
                    Some("American") | Some("Other") | None
                )
            })
            .count();

        AnalyticsSummary {
            total_records: total,
            fall_2025_count: fall_2025.len() as i64,
            international_pct: (total > 0)
                .then(|| round2(international as f64 * 100.0 / total as f64)),
            avg_gpa: avg(records.values().filter_map(|r| r.gpa).collect()),
            avg_gre: avg(records.values().filter_map(|r| r.gre).collect()),
            avg_gre_v: avg(records.values().filter_map(|r| r.gre_v).collect()),
            avg_gre_aw: avg(records.values().filter_map(|r| r.gre_aw).collect()),
            avg_gpa_american_fall_2025: avg(
                records
                    .values()
                    .filter(|r| {
                        r.us_or_international.as_deref() == Some("American") && is_fall_2025(r)
                    })
                    .filter_map(|r| r.gpa)
                    .collect(),
            ),
            fall_2025_acceptance_pct: (!fall_2025.is_empty()).then(|| {
                let accepted_count = fall_2025.iter().filter(|r| accepted(r)).count();
                round2(accepted_count as f64 * 100.0 / fall_2025.len() as f64)
            }),
            avg_gpa_accepted_fall_2025: avg(
                fall_2025
                    .iter()
                    .filter(|r| accepted(r))
                    .filter_map(|r| r.gpa)
                    .collect(),
            ),
            jhu_masters_cs_count: records
                .values()
                .filter(|r| {
                    (contains(&r.university, "johns hopkins") || contains(&r.university, "jhu"))
                        && (contains(&r.program, "computer science")
                            || contains(&r.llm_generated_program, "computer science"))
                        && contains(&r.degree, "masters")
                })
                .count() as i64,
            target_phd_cs_accept_count: records
                .values()
                .filter(|r| {
                    contains(&r.term, "2025")
                        && accepted(r)
                        && (contains(&r.university, "georgetown")
                            || contains(&r.university, "mit")
                            || contains(&r.university, "stanford")
                            || contains(&r.university, "carnegie mellon"))
                        && contains(&r.program, "computer science")
                        && contains(&r.degree, "phd")
                })
                .count() as i64,
            target_phd_cs_accept_count_llm: records
                .values()
                .filter(|r| {
                    contains(&r.term, "2025")
                        && accepted(r)
                        && matches!(
                            r.llm_generated_university.as_deref(),
                            Some("Georgetown University")
                                | Some("Massachusetts Institute of Technology")
                                | Some("Stanford University")
                                | Some("Carnegie Mellon University")
                        )
                        && contains(&r.llm_generated_program, "computer science")
                        && contains(&r.degree, "phd")
                })
                .count() as i64,
            computed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn watermark(&self, source: &str) -> Result<Option<String>> {
        Ok(self.watermark_value(source))
    }

    async fn load(&self, source: &str, records: &[ApplicantRecord]) -> Result<LoadSummary> {
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("injected storage fault"));
        }

        let mut stored = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut inserted = 0u64;
        for record in records {
            if !stored.contains_key(&record.url) {
                stored.insert(record.url.clone(), record.clone());
                inserted += 1;
            }
        }

        let mut watermarks = self.watermarks.lock().unwrap_or_else(|e| e.into_inner());
        let current = watermarks
            .get(source)
            .and_then(|v| EntryId::from_watermark(v));
        let newest = records.iter().filter_map(ApplicantRecord::entry_id).max();
        let watermark = match (newest, current) {
            (Some(new), current) if current.map_or(true, |c| new > c) => {
                watermarks.insert(source.to_string(), new.to_string());
                Some(new.to_string())
            }
            _ => watermarks.get(source).cloned(),
        };

        Ok(LoadSummary { inserted, watermark })
    }

    async fn refresh_analytics(&self) -> Result<()> {
        if self.fail_next_refresh.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("injected refresh fault"));
        }

        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let summary = Self::compute_summary(&records);
        *self.summary.lock().unwrap_or_else(|e| e.into_inner()) = Some(summary);
        Ok(())
    }
}

// =============================================================================
// StaticFetcher
// =============================================================================

/// Serves canned page HTML; pages past the end come back empty (no result
/// table), which the crawl driver reads as "source exhausted".
pub struct StaticFetcher {
    pages: Vec<String>,
    fetches: AtomicU32,
    fail_after: Option<u32>,
    fail_status: reqwest::StatusCode,
}

impl StaticFetcher {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages,
            fetches: AtomicU32::new(0),
            fail_after: None,
            fail_status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Fail every fetch once `n` fetches have succeeded.
    pub fn failing_after(mut self, n: u32) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Status code injected failures respond with.
    pub fn with_fail_status(mut self, status: reqwest::StatusCode) -> Self {
        self.fail_status = status;
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        let done = self.fetches.load(Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| done >= n) {
            return Err(FetchError::Status {
                url: format!("test://page/{}", page),
                status: self.fail_status,
            });
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .pages
            .get((page - 1) as usize)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }
}

// =============================================================================
// RecordingPublisher
// =============================================================================

/// Tracks published tasks for assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<TaskMessage>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<TaskMessage> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TaskPublisher for RecordingPublisher {
    async fn publish(&self, task: &TaskMessage) -> Result<()> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.clone());
        Ok(())
    }
}
