// GradStats Ingestion Worker - Core
//
// This crate implements the broker-mediated ingestion and refresh pipeline
// for admissions-result postings: a task consumer pulls work requests from
// NATS JetStream, performs watermark-bounded incremental scraping of
// TheGradCafe, loads records transactionally into PostgreSQL, and refreshes
// the precomputed analytics snapshot.

pub mod broker;
pub mod common;
pub mod config;
pub mod pipeline;
pub mod scrape;
pub mod store;
pub mod tasks;
pub mod testing;

pub use config::*;
