//! Task consumer loop.
//!
//! Pulls one message at a time from the durable consumer, routes it
//! through the pipeline, and resolves it from the returned `TaskOutcome`:
//! success acks (the message is gone for good), a transient failure naks
//! with backoff until the delivery count reaches the redelivery bound and
//! is then terminated (dead-letter), and a permanent failure terminates
//! immediately. A malformed payload is a poison message and is terminated
//! before it ever reaches the pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::message::{AckKind, Message};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;
use crate::tasks::{TaskMessage, TaskOutcome};

/// Long-running consumer service for one worker instance.
pub struct TaskConsumer {
    consumer: PullConsumer,
    pipeline: Arc<Pipeline>,
    max_deliver: i64,
    worker_id: String,
}

impl TaskConsumer {
    pub fn new(consumer: PullConsumer, pipeline: Arc<Pipeline>, max_deliver: i64) -> Self {
        Self {
            consumer,
            pipeline,
            max_deliver,
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Consume tasks until the shutdown token fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = %self.worker_id, "task consumer starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let mut messages = match self.consumer.messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "failed to open message stream, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(3)) => continue,
                    }
                }
            };

            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => return self.stopped(),
                    next = messages.next() => next,
                };

                match next {
                    Some(Ok(message)) => self.process_message(message).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "message stream error, reconnecting");
                        break;
                    }
                    None => {
                        warn!("message stream closed, reconnecting");
                        break;
                    }
                }
            }
        }

        self.stopped()
    }

    fn stopped(&self) {
        info!(worker_id = %self.worker_id, "task consumer stopped");
    }

    /// Dispatch one delivery and resolve it.
    async fn process_message(&self, message: Message) {
        let delivered = message.info().map(|info| info.delivered).unwrap_or(1);

        let task: TaskMessage = match serde_json::from_slice(&message.payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %Self::payload_preview(&message.payload),
                    "malformed task message, dead-lettering"
                );
                self.resolve(&message, AckKind::Term).await;
                return;
            }
        };

        info!(kind = %task.kind, delivered, "task received");
        let outcome = self.pipeline.handle(&task).await;

        match outcome {
            TaskOutcome::Success => {
                if let Err(e) = message.ack().await {
                    // The broker will redeliver; idempotent handlers make
                    // the repeat harmless
                    error!(kind = %task.kind, error = %e, "failed to ack completed task");
                } else {
                    info!(kind = %task.kind, "task acked");
                }
            }
            TaskOutcome::Transient(err) => {
                if delivered >= self.max_deliver {
                    error!(
                        kind = %task.kind,
                        delivered,
                        error = ?err,
                        payload = %Self::payload_preview(&message.payload),
                        "redelivery bound reached, dead-lettering"
                    );
                    self.resolve(&message, AckKind::Term).await;
                } else {
                    warn!(
                        kind = %task.kind,
                        delivered,
                        error = ?err,
                        "transient failure, requeueing"
                    );
                    self.resolve(&message, AckKind::Nak(Some(Self::backoff(delivered))))
                        .await;
                }
            }
            TaskOutcome::Permanent(err) => {
                error!(
                    kind = %task.kind,
                    error = ?err,
                    payload = %Self::payload_preview(&message.payload),
                    "permanent failure, dead-lettering"
                );
                self.resolve(&message, AckKind::Term).await;
            }
        }
    }

    async fn resolve(&self, message: &Message, ack: AckKind) {
        if let Err(e) = message.ack_with(ack).await {
            error!(error = %e, "failed to resolve message");
        }
    }

    /// Exponential redelivery delay, capped at five minutes.
    fn backoff(delivered: i64) -> Duration {
        let secs = 2u64.saturating_pow(delivered.clamp(0, 8) as u32).min(300);
        Duration::from_secs(secs)
    }

    /// Bounded, lossy rendering of a payload for dead-letter log lines,
    /// so a terminated message can be reconstructed and replayed.
    fn payload_preview(payload: &[u8]) -> String {
        String::from_utf8_lossy(payload).chars().take(1024).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(TaskConsumer::backoff(1), Duration::from_secs(2));
        assert_eq!(TaskConsumer::backoff(3), Duration::from_secs(8));
        assert_eq!(TaskConsumer::backoff(100), Duration::from_secs(256));
    }

    #[test]
    fn test_payload_preview_is_lossy_and_bounded() {
        assert_eq!(
            TaskConsumer::payload_preview(&[b'{', 0xff, b'}']),
            "{\u{fffd}}"
        );
        assert_eq!(
            TaskConsumer::payload_preview(&vec![b'a'; 5000]).chars().count(),
            1024
        );
    }
}
