//! Incremental extraction from the external listing source.

pub mod client;
pub mod incremental;
pub mod parse;

pub use client::{GradCafeClient, PageFetcher};
pub use incremental::{scrape_new_entries, ScrapeOutcome};
