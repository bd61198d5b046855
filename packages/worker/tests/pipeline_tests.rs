//! End-to-end pipeline tests against in-memory doubles.
//!
//! Covers the pipeline's core guarantees: idempotent loading, watermark
//! monotonicity, URL dedup, refresh idempotence, and safety under broker
//! redelivery, plus the failure paths (zero-progress crawls, partial
//! crawls, injected storage faults).

use std::sync::Arc;
use std::time::Duration;

use worker_core::pipeline::{Pipeline, SOURCE};
use worker_core::store::{ApplicantRecord, IngestStore};
use worker_core::tasks::{TaskKind, TaskMessage, TaskOutcome};
use worker_core::testing::{MemoryStore, StaticFetcher};
use worker_core::Config;

// =============================================================================
// Helpers
// =============================================================================

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        nats_url: "nats://unused".to_string(),
        max_pages_per_crawl: 10,
        fetch_timeout: Duration::from_secs(5),
        fetch_delay: Duration::ZERO,
        task_deadline: Duration::from_secs(30),
        max_deliver: 5,
    }
}

fn pipeline(store: Arc<MemoryStore>, fetcher: StaticFetcher) -> Pipeline {
    Pipeline::new(store, Arc::new(fetcher), &test_config())
}

fn url(id: u64) -> String {
    format!("https://www.thegradcafe.com/result/{id}")
}

fn record(id: u64) -> ApplicantRecord {
    ApplicantRecord {
        program: Some("Computer Science, PhD".to_string()),
        university: Some("Stanford University".to_string()),
        degree: Some("PhD".to_string()),
        status: Some("Accepted".to_string()),
        term: Some("Fall 2025".to_string()),
        us_or_international: Some("International".to_string()),
        comments: None,
        decision_date: Some("1 Feb".to_string()),
        date_added: Some("February 2, 2025".to_string()),
        url: url(id),
        gpa: Some(3.8),
        gre: Some(165.0),
        gre_v: Some(160.0),
        gre_aw: Some(4.0),
        llm_generated_program: None,
        llm_generated_university: None,
    }
}

/// One survey page: a main row plus a two-cell stats row per entry.
fn page(entries: &[u64]) -> String {
    let rows: String = entries
        .iter()
        .map(|id| {
            format!(
                "<tr><td>Stanford UniversityReport</td>\
                 <td><a href=\"/result/{id}\">Computer Science, PhD</a></td>\
                 <td>Feb 2, 2025</td><td>Accepted on 1 Feb</td></tr>\
                 <tr><td>Fall 2025 International GPA 3.80</td><td>GRE 165 GRE V 160 GRE AW 4.0</td></tr>"
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

fn scrape_task() -> TaskMessage {
    TaskMessage::new(TaskKind::ScrapeNewData)
}

fn recompute_task() -> TaskMessage {
    TaskMessage::new(TaskKind::RecomputeAnalytics)
}

// =============================================================================
// Loader properties
// =============================================================================

#[tokio::test]
async fn load_is_idempotent() {
    let store = MemoryStore::new();
    let batch = vec![record(3), record(2), record(1)];

    let first = store.load(SOURCE, &batch).await.unwrap();
    assert_eq!(first.inserted, 3);

    let second = store.load(SOURCE, &batch).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(store.record_count(), 3);
    assert_eq!(second.watermark, first.watermark);
}

#[tokio::test]
async fn watermark_never_regresses() {
    let store = MemoryStore::new();

    store.load(SOURCE, &[record(30)]).await.unwrap();
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("30"));

    // An older record still inserts, but the watermark holds
    let summary = store.load(SOURCE, &[record(20)]).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("30"));

    store.load(SOURCE, &[record(40)]).await.unwrap();
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("40"));
}

#[tokio::test]
async fn duplicate_url_keeps_existing_row() {
    let store = MemoryStore::new();
    store.load(SOURCE, &[record(7)]).await.unwrap();

    let mut altered = record(7);
    altered.status = Some("Rejected".to_string());
    let summary = store.load(SOURCE, &[altered]).await.unwrap();

    assert_eq!(summary.inserted, 0);
    assert_eq!(store.record_count(), 1);
    assert_eq!(
        store.record(&url(7)).unwrap().status.as_deref(),
        Some("Accepted")
    );
}

#[tokio::test]
async fn failed_load_leaves_store_and_watermark_untouched() {
    let store = MemoryStore::new();
    store.load(SOURCE, &[record(10)]).await.unwrap();

    store.fail_next_load();
    let err = store.load(SOURCE, &[record(20)]).await;
    assert!(err.is_err());
    assert_eq!(store.record_count(), 1);
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("10"));
}

// =============================================================================
// Scrape task behavior
// =============================================================================

#[tokio::test]
async fn scrape_task_loads_and_advances_watermark() {
    let store = Arc::new(MemoryStore::new());
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![page(&[103, 102, 101])]));

    let outcome = pipe.handle(&scrape_task()).await;
    assert!(outcome.is_success());
    assert_eq!(store.record_count(), 3);
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("103"));
}

#[tokio::test]
async fn second_scrape_stops_at_watermark_and_loads_only_newer() {
    let store = Arc::new(MemoryStore::new());

    // Initial crawl: R1..R3 newest-first
    let first = pipeline(store.clone(), StaticFetcher::new(vec![page(&[103, 102, 101])]));
    assert!(first.handle(&scrape_task()).await.is_success());
    assert_eq!(store.record_count(), 3);
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("103"));

    // Next crawl sees one new posting above the watermark
    let fetcher = StaticFetcher::new(vec![page(&[104, 103, 102])]);
    let second = pipeline(store.clone(), fetcher);
    assert!(second.handle(&scrape_task()).await.is_success());

    assert_eq!(store.record_count(), 4);
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("104"));
}

#[tokio::test]
async fn redelivered_scrape_task_is_harmless() {
    let store = Arc::new(MemoryStore::new());
    let pages = vec![page(&[55, 54])];

    // Two deliveries of the same task, as after a missed ack
    for _ in 0..2 {
        let pipe = pipeline(store.clone(), StaticFetcher::new(pages.clone()));
        assert!(pipe.handle(&scrape_task()).await.is_success());
    }

    assert_eq!(store.record_count(), 2);
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("55"));
}

#[tokio::test]
async fn zero_progress_crawl_is_transient() {
    let store = Arc::new(MemoryStore::new());
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![]).failing_after(0));

    let outcome = pipe.handle(&scrape_task()).await;
    assert!(matches!(outcome, TaskOutcome::Transient(_)));
    assert_eq!(store.record_count(), 0);
    assert_eq!(store.watermark_value(SOURCE), None);
}

#[tokio::test]
async fn throttled_zero_progress_crawl_is_retried() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = StaticFetcher::new(vec![])
        .failing_after(0)
        .with_fail_status(reqwest::StatusCode::TOO_MANY_REQUESTS);
    let pipe = pipeline(store.clone(), fetcher);

    // Throttling is not a dead-letter condition; the task requeues
    let outcome = pipe.handle(&scrape_task()).await;
    assert!(matches!(outcome, TaskOutcome::Transient(_)));
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn missing_page_zero_progress_crawl_is_permanent() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = StaticFetcher::new(vec![])
        .failing_after(0)
        .with_fail_status(reqwest::StatusCode::NOT_FOUND);
    let pipe = pipeline(store.clone(), fetcher);

    let outcome = pipe.handle(&scrape_task()).await;
    assert!(matches!(outcome, TaskOutcome::Permanent(_)));
}

#[tokio::test]
async fn partial_crawl_loads_extracted_records() {
    let store = Arc::new(MemoryStore::new());
    // Page 1 succeeds, page 2 fails mid-crawl
    let fetcher = StaticFetcher::new(vec![page(&[80, 79]), page(&[78])]).failing_after(1);
    let pipe = pipeline(store.clone(), fetcher);

    let outcome = pipe.handle(&scrape_task()).await;
    assert!(outcome.is_success());
    assert_eq!(store.record_count(), 2);
    // Watermark reflects the newest record actually loaded, so the next
    // crawl re-covers everything the failure skipped
    assert_eq!(store.watermark_value(SOURCE).as_deref(), Some("80"));
}

#[tokio::test]
async fn empty_source_scrape_succeeds_without_changes() {
    let store = Arc::new(MemoryStore::new());
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![]));

    assert!(pipe.handle(&scrape_task()).await.is_success());
    assert_eq!(store.record_count(), 0);
    assert_eq!(store.watermark_value(SOURCE), None);
}

#[tokio::test]
async fn store_fault_during_load_is_transient() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next_load();
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![page(&[5])]));

    let outcome = pipe.handle(&scrape_task()).await;
    assert!(matches!(outcome, TaskOutcome::Transient(_)));
    assert_eq!(store.record_count(), 0);
}

// =============================================================================
// Recompute task behavior
// =============================================================================

#[tokio::test]
async fn recompute_on_empty_store_yields_zeroed_summary() {
    let store = Arc::new(MemoryStore::new());
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![]));

    assert!(pipe.handle(&recompute_task()).await.is_success());

    let summary = store.summary().expect("snapshot computed");
    assert_eq!(summary.total_records, 0);
    assert_eq!(summary.fall_2025_count, 0);
    assert_eq!(summary.international_pct, None);
    assert_eq!(summary.avg_gpa, None);
    assert_eq!(summary.avg_gre, None);
    assert_eq!(summary.fall_2025_acceptance_pct, None);
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store
        .load(SOURCE, &[record(1), record(2), record(3)])
        .await
        .unwrap();
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![]));

    assert!(pipe.handle(&recompute_task()).await.is_success());
    let first = store.summary().unwrap();

    assert!(pipe.handle(&recompute_task()).await.is_success());
    let mut second = store.summary().unwrap();
    second.computed_at = first.computed_at;

    assert_eq!(first, second);
}

#[tokio::test]
async fn summary_reflects_loaded_records() {
    let store = Arc::new(MemoryStore::new());

    let mut rejected = record(2);
    rejected.status = Some("Rejected".to_string());
    rejected.us_or_international = Some("American".to_string());
    rejected.gpa = Some(3.4);
    store.load(SOURCE, &[record(1), rejected]).await.unwrap();

    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![]));
    assert!(pipe.handle(&recompute_task()).await.is_success());

    let summary = store.summary().unwrap();
    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.fall_2025_count, 2);
    assert_eq!(summary.international_pct, Some(50.0));
    assert_eq!(summary.fall_2025_acceptance_pct, Some(50.0));
    assert_eq!(summary.avg_gpa, Some((3.8 + 3.4) / 2.0));
    assert_eq!(summary.avg_gpa_accepted_fall_2025, Some(3.8));
    assert_eq!(summary.avg_gpa_american_fall_2025, Some(3.4));
    // Accepted Stanford PhD CS in 2025, matched on raw fields only
    assert_eq!(summary.target_phd_cs_accept_count, 1);
    assert_eq!(summary.target_phd_cs_accept_count_llm, 0);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let store = Arc::new(MemoryStore::new());
    store.load(SOURCE, &[record(1)]).await.unwrap();
    let pipe = pipeline(store.clone(), StaticFetcher::new(vec![]));

    assert!(pipe.handle(&recompute_task()).await.is_success());
    let before = store.summary().unwrap();

    store.load(SOURCE, &[record(2)]).await.unwrap();
    store.fail_next_refresh();
    let outcome = pipe.handle(&recompute_task()).await;
    assert!(matches!(outcome, TaskOutcome::Transient(_)));

    // Readers still see the pre-failure snapshot
    assert_eq!(store.summary().unwrap(), before);

    // The next recompute picks up the new record
    assert!(pipe.handle(&recompute_task()).await.is_success());
    assert_eq!(store.summary().unwrap().total_records, 2);
}
