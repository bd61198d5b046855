//! Broker-agnostic task dispatch.
//!
//! The pipeline maps a `TaskMessage` to a `TaskOutcome`; the broker layer
//! turns that into ack / requeue / dead-letter. Storage goes through the
//! `IngestStore` trait and page fetching through `PageFetcher`, so the
//! routing and failure classification here is unit-testable with doubles.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{info, warn};

use crate::config::Config;
use crate::scrape::{self, PageFetcher};
use crate::store::{EntryId, IngestStore};
use crate::tasks::{TaskKind, TaskMessage, TaskOutcome};

/// Ingestion source identifier all scrape tasks are bound to.
pub const SOURCE: &str = "gradcafe";

/// Executes tasks against the store and the external source.
pub struct Pipeline {
    store: Arc<dyn IngestStore>,
    fetcher: Arc<dyn PageFetcher>,
    max_pages: u32,
    fetch_delay: Duration,
    task_deadline: Duration,
}

impl Pipeline {
    pub fn new(store: Arc<dyn IngestStore>, fetcher: Arc<dyn PageFetcher>, config: &Config) -> Self {
        Self {
            store,
            fetcher,
            max_pages: config.max_pages_per_crawl,
            fetch_delay: config.fetch_delay,
            task_deadline: config.task_deadline,
        }
    }

    /// Execute one task under the stage deadline.
    pub async fn handle(&self, task: &TaskMessage) -> TaskOutcome {
        let work = async {
            match task.kind {
                TaskKind::ScrapeNewData => self.scrape_and_load().await,
                TaskKind::RecomputeAnalytics => self.recompute().await,
            }
        };

        match tokio::time::timeout(self.task_deadline, work).await {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Transient(anyhow!(
                "task {} exceeded deadline of {:?}",
                task.kind,
                self.task_deadline
            )),
        }
    }

    /// Scrape new postings above the watermark and load them.
    ///
    /// The crawl completes before the load transaction opens, so no
    /// transaction is ever held across external-source I/O.
    async fn scrape_and_load(&self) -> TaskOutcome {
        let watermark = match self.store.watermark(SOURCE).await {
            Ok(value) => value,
            Err(e) => return TaskOutcome::Transient(e.context("reading ingestion watermark")),
        };
        let mark = watermark.as_deref().and_then(EntryId::from_watermark);
        info!(
            source = SOURCE,
            watermark = watermark.as_deref().unwrap_or("-"),
            "starting incremental scrape"
        );

        let outcome =
            scrape::scrape_new_entries(self.fetcher.as_ref(), mark, self.max_pages, self.fetch_delay)
                .await;

        if outcome.records.is_empty() {
            return match outcome.error {
                Some(error) => {
                    let context = format!(
                        "scrape made no progress (source {}, watermark {})",
                        SOURCE,
                        watermark.as_deref().unwrap_or("-")
                    );
                    if error.is_transient() {
                        TaskOutcome::Transient(anyhow!(error).context(context))
                    } else {
                        TaskOutcome::Permanent(anyhow!(error).context(context))
                    }
                }
                None => {
                    info!(source = SOURCE, "no new records");
                    TaskOutcome::Success
                }
            };
        }

        if let Some(error) = &outcome.error {
            // Partial crawl: load what we have, the watermark only advances
            // to the newest record actually extracted, so the next scrape
            // picks up where this one broke off.
            warn!(
                source = SOURCE,
                extracted = outcome.records.len(),
                error = %error,
                "crawl ended early, loading partial batch"
            );
        }

        match self.store.load(SOURCE, &outcome.records).await {
            Ok(summary) => {
                info!(
                    source = SOURCE,
                    scraped = outcome.records.len(),
                    inserted = summary.inserted,
                    watermark = summary.watermark.as_deref().unwrap_or("-"),
                    "scrape task complete"
                );
                TaskOutcome::Success
            }
            Err(e) => TaskOutcome::Transient(e.context("loading scraped records")),
        }
    }

    /// Recompute the analytics snapshot.
    async fn recompute(&self) -> TaskOutcome {
        match self.store.refresh_analytics().await {
            Ok(()) => {
                info!("recompute task complete");
                TaskOutcome::Success
            }
            Err(e) => TaskOutcome::Transient(e.context("refreshing analytics snapshot")),
        }
    }
}
