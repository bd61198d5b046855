//! NATS JetStream integration.
//!
//! Tasks live on a work-queue stream: each message is owned by one worker
//! while unacknowledged and removed permanently on ack. A durable pull
//! consumer with explicit acks gives the at-least-once delivery the
//! pipeline is built to tolerate; `max_deliver` bounds redelivery before a
//! message is dead-lettered.

pub mod consumer;
pub mod publisher;

pub use consumer::TaskConsumer;
pub use publisher::{JetStreamTaskPublisher, TaskPublisher};

use anyhow::{Context as _, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream,
};
use std::time::Duration;

/// Stream holding pending task messages.
pub const STREAM_NAME: &str = "TASKS";
/// Subject task messages are published to.
pub const TASK_SUBJECT: &str = "tasks";
/// Durable consumer shared by all worker instances.
pub const CONSUMER_NAME: &str = "ingest-worker";

/// Connect to NATS and return a JetStream context.
pub async fn connect(nats_url: &str) -> Result<jetstream::Context> {
    let client = async_nats::connect(nats_url)
        .await
        .with_context(|| format!("connecting to NATS at {}", nats_url))?;
    Ok(jetstream::new(client))
}

/// Create the task stream if it does not exist yet.
pub async fn ensure_stream(js: &jetstream::Context) -> Result<stream::Stream> {
    let stream = js
        .get_or_create_stream(stream::Config {
            name: STREAM_NAME.to_string(),
            subjects: vec![TASK_SUBJECT.to_string()],
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .context("creating task stream")?;
    Ok(stream)
}

/// Create or look up the durable pull consumer for task processing.
pub async fn task_consumer(stream: &stream::Stream, max_deliver: i64) -> Result<PullConsumer> {
    let consumer = stream
        .get_or_create_consumer(
            CONSUMER_NAME,
            pull::Config {
                durable_name: Some(CONSUMER_NAME.to_string()),
                ack_policy: AckPolicy::Explicit,
                max_deliver,
                // Long-running scrapes must finish before the broker
                // assumes the worker died and redelivers
                ack_wait: Duration::from_secs(600),
                ..Default::default()
            },
        )
        .await
        .context("creating task consumer")?;
    Ok(consumer)
}
