//! Watermark-bounded incremental crawl driver.
//!
//! Pages are fetched in the source's native reverse-chronological order.
//! Extraction stops the moment a record at or before the watermark shows
//! up: everything older is assumed already ingested. If the source ever
//! reorders or backfills postings below the watermark they are missed;
//! that limitation is inherited from the source's ordering and not
//! corrected here.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::client::PageFetcher;
use super::parse;
use crate::common::FetchError;
use crate::store::{ApplicantRecord, EntryId};

/// Result of one incremental crawl.
///
/// A mid-crawl fetch failure does not discard progress: the records
/// extracted before the failure are kept alongside the error, and the
/// caller decides whether the crawl counts as a partial success (some
/// records) or a transient failure (none).
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub records: Vec<ApplicantRecord>,
    pub pages_fetched: u32,
    pub error: Option<FetchError>,
}

impl ScrapeOutcome {
    /// True when the crawl failed before extracting anything.
    pub fn is_zero_progress_failure(&self) -> bool {
        self.records.is_empty() && self.error.is_some()
    }
}

/// Crawl forward from page 1 until the watermark, the page budget, or the
/// end of the source is reached.
pub async fn scrape_new_entries(
    fetcher: &dyn PageFetcher,
    watermark: Option<EntryId>,
    max_pages: u32,
    delay: Duration,
) -> ScrapeOutcome {
    let mut records = Vec::new();
    let mut pages_fetched = 0u32;

    for page in 1..=max_pages {
        if page > 1 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let html = match fetcher.fetch_page(page).await {
            Ok(html) => html,
            Err(e) => {
                warn!(page, error = %e, "page fetch failed, keeping partial crawl");
                return ScrapeOutcome {
                    records,
                    pages_fetched,
                    error: Some(e),
                };
            }
        };
        pages_fetched += 1;

        let page_records = parse::parse_page(&html);
        if page_records.is_empty() {
            debug!(page, "no result rows, source exhausted");
            break;
        }

        for record in page_records {
            if let (Some(id), Some(mark)) = (record.entry_id(), watermark) {
                if id <= mark {
                    info!(entry_id = %id, watermark = %mark, "reached watermark, stopping crawl");
                    return ScrapeOutcome {
                        records,
                        pages_fetched,
                        error: None,
                    };
                }
            }
            records.push(record);
        }
    }

    info!(
        count = records.len(),
        pages = pages_fetched,
        "crawl finished without hitting watermark"
    );
    ScrapeOutcome {
        records,
        pages_fetched,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticFetcher;

    fn page_html(ids: &[u64]) -> String {
        let rows: String = ids
            .iter()
            .map(|id| {
                format!(
                    "<tr><td>U{id}</td><td><a href=\"/result/{id}\">CS, PhD</a></td>\
                     <td>Feb 1, 2025</td><td>Accepted on 1 Feb</td></tr>"
                )
            })
            .collect();
        format!("<html><table>{rows}</table></html>")
    }

    #[tokio::test]
    async fn test_full_crawl_without_watermark() {
        let fetcher = StaticFetcher::new(vec![page_html(&[30, 20]), page_html(&[10])]);
        let outcome = scrape_new_entries(&fetcher, None, 10, Duration::ZERO).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.records.len(), 3);
        // Pages past the source's end yield no table and end the crawl
        assert_eq!(outcome.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_stops_at_watermark_without_fetching_further() {
        let fetcher = StaticFetcher::new(vec![page_html(&[30, 20]), page_html(&[10])]);
        let outcome =
            scrape_new_entries(&fetcher, Some(EntryId(20)), 10, Duration::ZERO).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].url,
            "https://www.thegradcafe.com/result/30"
        );
        // Stopped inside page 1, page 2 never requested
        assert_eq!(outcome.pages_fetched, 1);
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_mid_crawl_failure_keeps_partial_progress() {
        let fetcher = StaticFetcher::new(vec![page_html(&[30, 20])]).failing_after(1);
        let outcome = scrape_new_entries(&fetcher, None, 10, Duration::ZERO).await;

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.error.is_some());
        assert!(!outcome.is_zero_progress_failure());
    }

    #[tokio::test]
    async fn test_immediate_failure_is_zero_progress() {
        let fetcher = StaticFetcher::new(vec![]).failing_after(0);
        let outcome = scrape_new_entries(&fetcher, None, 10, Duration::ZERO).await;

        assert!(outcome.is_zero_progress_failure());
    }

    #[tokio::test]
    async fn test_respects_page_budget() {
        let pages: Vec<String> = (0..5).map(|i| page_html(&[100 - i])).collect();
        let fetcher = StaticFetcher::new(pages);
        let outcome = scrape_new_entries(&fetcher, None, 2, Duration::ZERO).await;

        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.records.len(), 2);
    }
}
