// Main entry point for the ingestion worker

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker_core::broker::{self, TaskConsumer};
use worker_core::pipeline::Pipeline;
use worker_core::scrape::GradCafeClient;
use worker_core::store::PgStore;
use worker_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting GradStats ingestion worker");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Connect to the broker and set up the task stream
    let js = broker::connect(&config.nats_url).await?;
    let stream = broker::ensure_stream(&js).await?;
    let consumer = broker::task_consumer(&stream, config.max_deliver).await?;
    tracing::info!("Broker connected, task stream ready");

    // Wire up the pipeline
    let store = Arc::new(PgStore::new(pool));
    let fetcher = Arc::new(
        GradCafeClient::new(config.fetch_timeout).context("Failed to build HTTP client")?,
    );
    let pipeline = Arc::new(Pipeline::new(store, fetcher, &config));

    // Run until interrupted
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    TaskConsumer::new(consumer, pipeline, config.max_deliver)
        .run(shutdown)
        .await;

    Ok(())
}
