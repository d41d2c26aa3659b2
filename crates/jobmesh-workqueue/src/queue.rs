//! Broker-agnostic durable queue interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use jobmesh_config::{QueueBackend, QueueConfig};

use crate::error::QueueError;
use crate::memory::MemoryQueue;
use crate::message::QueueMessage;
use crate::store::FileQueue;

/// Result of handing a message to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueReceipt {
    /// The message was stored.
    Enqueued { message_id: String },
    /// A message with the same dedup key is already known; nothing stored.
    Duplicate { dedup_key: String },
}

impl EnqueueReceipt {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueReceipt::Duplicate { .. })
    }
}

/// A message handed out by the broker, pending ack or nack.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueueMessage,
    /// Broker-specific token identifying this delivery.
    pub receipt: String,
}

/// Durable queue with at-least-once delivery.
///
/// One broker instance serves every named queue; messages carry their
/// queue name.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Backend name for logging.
    fn backend(&self) -> &str;

    /// Store a message unless its dedup key was seen within the window.
    async fn enqueue(&self, message: QueueMessage) -> Result<EnqueueReceipt, QueueError>;

    /// Take the oldest available message of `queue_name`, if any.
    async fn receive(&self, queue_name: &str) -> Result<Option<Delivery>, QueueError>;

    /// Remove a delivered message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return a delivered message to the queue for redelivery.
    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return deliveries abandoned by crashed consumers. Returns how many.
    async fn recover(&self, _queue_name: &str) -> Result<usize, QueueError> {
        Ok(0)
    }
}

/// Open the broker selected by `config`.
pub async fn open_queue(config: &QueueConfig) -> Result<Arc<dyn DurableQueue>, QueueError> {
    let dedup_window = Duration::from_secs(config.dedup_window_secs);
    match config.backend {
        QueueBackend::Memory => Ok(Arc::new(MemoryQueue::new(dedup_window))),
        QueueBackend::File => {
            let queue = FileQueue::open(
                &config.path,
                dedup_window,
                Duration::from_secs(config.visibility_timeout_secs),
            )
            .await?;
            Ok(Arc::new(queue))
        }
    }
}

/// Stream of deliveries from `queue_name`, polling every `poll_interval`
/// while the queue is empty. Ends when `cancel` fires.
pub fn consume(
    queue: Arc<dyn DurableQueue>,
    queue_name: String,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = Delivery> + Send {
    futures::stream::unfold(
        (queue, queue_name, cancel),
        move |(queue, queue_name, cancel)| async move {
            loop {
                if cancel.is_cancelled() {
                    return None;
                }

                match queue.receive(&queue_name).await {
                    Ok(Some(delivery)) => return Some((delivery, (queue, queue_name, cancel))),
                    Ok(None) => {}
                    Err(e) => warn!(queue = %queue_name, "Failed to receive: {}", e),
                }

                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        },
    )
}
