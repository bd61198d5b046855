//! Task publishing.
//!
//! The producer-facing surface is a single operation: enqueue a task
//! message. The trait keeps callers (CLI, tests) independent of the wire.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use super::TASK_SUBJECT;
use crate::tasks::TaskMessage;

/// Enqueue task messages for the worker fleet.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    async fn publish(&self, task: &TaskMessage) -> Result<()>;
}

/// Publishes tasks onto the JetStream task stream, waiting for the
/// broker's storage ack so an accepted publish is durable.
pub struct JetStreamTaskPublisher {
    context: async_nats::jetstream::Context,
}

impl JetStreamTaskPublisher {
    pub fn new(context: async_nats::jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TaskPublisher for JetStreamTaskPublisher {
    async fn publish(&self, task: &TaskMessage) -> Result<()> {
        let payload = serde_json::to_vec(task).context("serializing task message")?;
        self.context
            .publish(TASK_SUBJECT, Bytes::from(payload))
            .await
            .context("publishing task message")?
            .await
            .context("waiting for broker ack")?;
        info!(kind = %task.kind, "task published");
        Ok(())
    }
}
