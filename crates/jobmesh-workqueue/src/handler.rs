//! Consumer-side handlers and their bindings.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobmesh_core::{JobError, JobOptionsOverride};

use crate::message::QueueMessage;

/// Delivery metadata passed to a handler attempt.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub message_id: String,
    pub queue_name: String,
    pub job_name: String,
    /// Handler attempt within this delivery, from 1.
    pub attempt: u32,
    /// How many times the broker delivered this message before.
    pub redeliveries: u32,
    pub scheduled_for: DateTime<Utc>,
}

impl DeliveryContext {
    pub fn from_message(message: &QueueMessage, attempt: u32) -> Self {
        Self {
            message_id: message.id.to_string(),
            queue_name: message.queue_name.clone(),
            job_name: message.job_name.clone(),
            attempt,
            redeliveries: message.attempt_count,
            scheduled_for: message.scheduled_for,
        }
    }
}

/// Consumes messages of one job name.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value, ctx: DeliveryContext) -> Result<(), JobError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> QueueHandler for FnHandler<F>
where
    F: Fn(serde_json::Value, DeliveryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn handle(&self, payload: serde_json::Value, ctx: DeliveryContext) -> Result<(), JobError> {
        (self.f)(payload, ctx).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn QueueHandler>
where
    F: Fn(serde_json::Value, DeliveryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// `(queue_name, job_name) -> handler`.
#[derive(Clone)]
pub struct HandlerBinding {
    pub queue_name: String,
    pub job_name: String,
    /// Overlap and retry options; unset fields use the global defaults.
    pub options: JobOptionsOverride,
    pub handler: Arc<dyn QueueHandler>,
}

impl HandlerBinding {
    pub fn new(
        queue_name: impl Into<String>,
        job_name: impl Into<String>,
        handler: Arc<dyn QueueHandler>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            job_name: job_name.into(),
            options: JobOptionsOverride::default(),
            handler,
        }
    }

    pub fn prevent_overlap(mut self, prevent_overlap: bool) -> Self {
        self.options.prevent_overlap = Some(prevent_overlap);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retries = Some(retries);
        self
    }

    pub fn retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.options.retry_delay_ms = Some(retry_delay_ms);
        self
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("queue_name", &self.queue_name)
            .field("job_name", &self.job_name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A named group of queue handlers.
pub trait HandlerProvider: Send + Sync {
    fn name(&self) -> &str;

    fn handlers(&self) -> Vec<HandlerBinding>;
}
