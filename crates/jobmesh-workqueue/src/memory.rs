//! In-process broker.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::QueueError;
use crate::message::QueueMessage;
use crate::queue::{Delivery, DurableQueue, EnqueueReceipt};

#[derive(Default)]
struct Inner {
    pending: HashMap<String, VecDeque<QueueMessage>>,
    inflight: HashMap<String, QueueMessage>,
    /// `queue/dedup_key` -> first seen.
    seen: HashMap<String, Instant>,
    acked: u64,
    nacked: u64,
}

/// Queue that lives in process memory. Messages are lost on exit.
pub struct MemoryQueue {
    dedup_window: Duration,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    /// Create a queue suppressing duplicate keys for `dedup_window`.
    pub fn new(dedup_window: Duration) -> Self {
        Self {
            dedup_window,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Messages waiting in `queue_name`.
    pub fn pending_len(&self, queue_name: &str) -> usize {
        self.inner
            .lock()
            .pending
            .get(queue_name)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Delivered but not yet acknowledged messages across all queues.
    pub fn inflight_len(&self) -> usize {
        self.inner.lock().inflight.len()
    }

    pub fn acked_count(&self) -> u64 {
        self.inner.lock().acked
    }

    pub fn nacked_count(&self) -> u64 {
        self.inner.lock().nacked
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn enqueue(&self, message: QueueMessage) -> Result<EnqueueReceipt, QueueError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let window = self.dedup_window;
        inner.seen.retain(|_, first_seen| now.duration_since(*first_seen) < window);

        let seen_key = format!("{}/{}", message.queue_name, message.dedup_key);
        if inner.seen.contains_key(&seen_key) {
            return Ok(EnqueueReceipt::Duplicate {
                dedup_key: message.dedup_key,
            });
        }
        inner.seen.insert(seen_key, now);

        let message_id = message.id.to_string();
        debug!(queue = %message.queue_name, job_name = %message.job_name, "Enqueued message {}", message_id);
        inner
            .pending
            .entry(message.queue_name.clone())
            .or_default()
            .push_back(message);

        Ok(EnqueueReceipt::Enqueued { message_id })
    }

    async fn receive(&self, queue_name: &str) -> Result<Option<Delivery>, QueueError> {
        let mut inner = self.inner.lock();
        let Some(message) = inner.pending.get_mut(queue_name).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        let receipt = message.id.to_string();
        inner.inflight.insert(receipt.clone(), message.clone());
        Ok(Some(Delivery { message, receipt }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner
            .inflight
            .remove(&delivery.receipt)
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.receipt.clone()))?;
        inner.acked += 1;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let mut message = inner
            .inflight
            .remove(&delivery.receipt)
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.receipt.clone()))?;
        message.attempt_count += 1;
        inner.nacked += 1;
        inner
            .pending
            .entry(message.queue_name.clone())
            .or_default()
            .push_back(message);
        Ok(())
    }
}
