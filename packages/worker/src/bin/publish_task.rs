// Thin CLI to enqueue a task for the worker fleet.
//
// Usage: publish-task scrape_new_data | recompute_analytics

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker_core::broker::{self, JetStreamTaskPublisher, TaskPublisher};
use worker_core::tasks::{TaskKind, TaskMessage};
use worker_core::Config;

#[derive(Parser)]
#[command(name = "publish-task", about = "Enqueue a task for the ingestion worker")]
struct Args {
    /// Task kind: scrape_new_data or recompute_analytics
    kind: TaskKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let js = broker::connect(&config.nats_url).await?;
    broker::ensure_stream(&js).await?;

    JetStreamTaskPublisher::new(js)
        .publish(&TaskMessage::new(args.kind))
        .await?;

    Ok(())
}
