//! Task message types and the pipeline outcome contract.
//!
//! A `TaskMessage` is the broker payload: a `kind` discriminant plus an
//! optional free-form payload. The pipeline resolves each message to a
//! `TaskOutcome`, which the broker layer translates into ack / requeue /
//! dead-letter. Keeping the outcome a plain tagged value keeps the
//! pipeline broker-agnostic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task kinds understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "scrape_new_data")]
    ScrapeNewData,
    #[serde(rename = "recompute_analytics")]
    RecomputeAnalytics,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::ScrapeNewData => write!(f, "scrape_new_data"),
            TaskKind::RecomputeAnalytics => write!(f, "recompute_analytics"),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "scrape_new_data" => Ok(TaskKind::ScrapeNewData),
            "recompute_analytics" => Ok(TaskKind::RecomputeAnalytics),
            _ => Err(anyhow::anyhow!("Invalid task kind: {}", s)),
        }
    }
}

/// A task request as published to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub kind: TaskKind,
    /// Publish timestamp, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    /// Optional free-form payload; no task currently requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TaskMessage {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            ts: Some(Utc::now()),
            payload: None,
        }
    }
}

/// Resolution of one task execution.
///
/// The broker-integration layer maps this onto the wire protocol:
/// `Success` acks, `Transient` naks for redelivery (bounded by the
/// delivery count), `Permanent` terminates the message (dead-letter).
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    /// Worth retrying: network, broker, or database connectivity fault
    Transient(anyhow::Error),
    /// Never retried: malformed input or a fault redelivery cannot fix
    Permanent(anyhow::Error),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}
