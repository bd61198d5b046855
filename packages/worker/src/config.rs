use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    /// Upper bound on pages fetched per incremental crawl
    pub max_pages_per_crawl: u32,
    /// Timeout for a single page fetch
    pub fetch_timeout: Duration,
    /// Politeness delay between page fetches
    pub fetch_delay: Duration,
    /// Overall deadline for one task execution (scrape or recompute)
    pub task_deadline: Duration,
    /// Redelivery bound before a transient failure is dead-lettered
    pub max_deliver: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            max_pages_per_crawl: env::var("MAX_PAGES_PER_CRAWL")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("MAX_PAGES_PER_CRAWL must be a valid number")?,
            fetch_timeout: Duration::from_secs(
                env::var("FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("FETCH_TIMEOUT_SECS must be a valid number")?,
            ),
            fetch_delay: Duration::from_millis(
                env::var("FETCH_DELAY_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("FETCH_DELAY_MS must be a valid number")?,
            ),
            task_deadline: Duration::from_secs(
                env::var("TASK_DEADLINE_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .context("TASK_DEADLINE_SECS must be a valid number")?,
            ),
            max_deliver: env::var("MAX_DELIVER")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("MAX_DELIVER must be a valid number")?,
        })
    }
}
