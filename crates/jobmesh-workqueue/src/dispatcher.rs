//! Producer side: turns a due job into a queue message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use jobmesh_core::{JobDescriptor, SchedulerError};

use crate::message::{dedup_key, QueueMessage};
use crate::queue::{DurableQueue, EnqueueReceipt};

/// Hands queue-bound jobs to the broker.
#[derive(Clone)]
pub struct QueueDispatcher {
    queue: Arc<dyn DurableQueue>,
    default_queue_name: String,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<dyn DurableQueue>, default_queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            default_queue_name: default_queue_name.into(),
        }
    }

    pub fn queue(&self) -> &Arc<dyn DurableQueue> {
        &self.queue
    }

    pub fn default_queue_name(&self) -> &str {
        &self.default_queue_name
    }

    /// Enqueue one execution of `descriptor` for `tick`.
    ///
    /// The dedup key is derived from the registered job name, so jobs that
    /// share a handler still get one message each. A broker-level duplicate
    /// (another producer already enqueued this tick) counts as success.
    pub async fn enqueue(
        &self,
        descriptor: &JobDescriptor,
        payload: serde_json::Value,
        tick: DateTime<Utc>,
    ) -> Result<EnqueueReceipt, SchedulerError> {
        let queue_name = descriptor
            .queue_name()
            .unwrap_or(&self.default_queue_name);
        let message = QueueMessage::new(queue_name, descriptor.queue_job_name(), payload, tick)
            .with_dedup_key(dedup_key(descriptor.name(), tick));
        self.send(message).await
    }

    /// Enqueue a message for `job_name` on `queue_name` directly.
    pub async fn enqueue_to(
        &self,
        queue_name: &str,
        job_name: &str,
        payload: serde_json::Value,
        tick: DateTime<Utc>,
    ) -> Result<EnqueueReceipt, SchedulerError> {
        self.send(QueueMessage::new(queue_name, job_name, payload, tick))
            .await
    }

    async fn send(&self, message: QueueMessage) -> Result<EnqueueReceipt, SchedulerError> {
        let queue_name = message.queue_name.clone();
        let job_name = message.job_name.clone();
        let dedup_key = message.dedup_key.clone();

        let receipt = self.queue.enqueue(message).await.map_err(|e| {
            SchedulerError::EnqueueFailed(format!("{} on '{}': {}", job_name, queue_name, e))
        })?;

        match &receipt {
            EnqueueReceipt::Enqueued { message_id } => {
                info!(queue = %queue_name, job_name = %job_name, message_id = %message_id, dedup_key = %dedup_key, "Job enqueued");
            }
            EnqueueReceipt::Duplicate { .. } => {
                debug!(queue = %queue_name, job_name = %job_name, dedup_key = %dedup_key, "Duplicate enqueue suppressed");
            }
        }
        Ok(receipt)
    }
}
