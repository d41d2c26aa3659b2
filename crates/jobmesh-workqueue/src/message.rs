//! Queue message definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deterministic dedup key for one tick of one job.
///
/// Every producer that fires `job_name` for the same tick computes the same
/// key, so the broker keeps a single message per tick.
pub fn dedup_key(job_name: &str, tick: DateTime<Utc>) -> String {
    format!("{}@{}", job_name, tick.timestamp_millis())
}

/// A unit of work on a durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message ID.
    pub id: Uuid,
    /// Queue the message belongs to.
    pub queue_name: String,
    /// Discriminator used to route the message to a handler.
    pub job_name: String,
    pub dedup_key: String,
    /// Opaque payload.
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Number of times the broker handed this message out before.
    pub attempt_count: u32,
    /// The tick the message was produced for.
    pub scheduled_for: DateTime<Utc>,
}

impl QueueMessage {
    /// Create a message for `job_name` produced at `tick`.
    pub fn new(
        queue_name: impl Into<String>,
        job_name: impl Into<String>,
        payload: serde_json::Value,
        tick: DateTime<Utc>,
    ) -> Self {
        let job_name = job_name.into();
        Self {
            id: Uuid::new_v4(),
            queue_name: queue_name.into(),
            dedup_key: dedup_key(&job_name, tick),
            job_name,
            payload,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            scheduled_for: tick,
        }
    }

    /// Replace the dedup key.
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = key.into();
        self
    }
}
