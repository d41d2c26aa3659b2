//! Job bodies and the providers that contribute them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::JobDefinition;
use crate::error::JobError;

/// What caused an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// The run-on-start firing.
    Startup,
    /// A cron occurrence.
    Cron,
    /// An operator-requested run.
    Manual,
    /// A queue delivery.
    Queue { message_id: String },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Startup => write!(f, "startup"),
            Trigger::Cron => write!(f, "cron"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::Queue { message_id } => write!(f, "queue:{}", message_id),
        }
    }
}

/// Context passed to every attempt of a job body.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_name: String,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    pub trigger: Trigger,
    /// The tick this execution was produced for.
    pub scheduled_for: DateTime<Utc>,
    /// Opaque payload; `Null` for local triggers.
    pub payload: serde_json::Value,
}

impl JobContext {
    pub fn new(job_name: impl Into<String>, trigger: Trigger, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            job_name: job_name.into(),
            attempt: 1,
            trigger,
            scheduled_for,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The same context for attempt number `attempt`.
    pub fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}

/// A scheduled job body.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// Adapter turning an async closure into a [`Job`].
pub struct FnJob<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as a shareable job body.
pub fn job_fn<F, Fut>(f: F) -> Arc<dyn Job>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(FnJob { f })
}

/// A job definition together with its body.
#[derive(Clone)]
pub struct JobBinding {
    pub definition: JobDefinition,
    pub job: Arc<dyn Job>,
}

impl JobBinding {
    pub fn new(definition: JobDefinition, job: Arc<dyn Job>) -> Self {
        Self { definition, job }
    }
}

impl fmt::Debug for JobBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobBinding")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// A named group of jobs contributed to the scheduler.
pub trait JobProvider: Send + Sync {
    /// Provider name used for feature selection.
    fn name(&self) -> &str;

    fn jobs(&self) -> Vec<JobBinding>;
}
