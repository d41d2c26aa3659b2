//! Worker host consuming one queue.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use jobmesh_config::QueueConfig;
use jobmesh_core::{ExecutionReport, JobOptions, JobRunner, RunOutcome, SchedulerError};

use crate::handler::{DeliveryContext, HandlerBinding, QueueHandler};
use crate::queue::{consume, Delivery, DurableQueue};

/// A handler resolved against the global defaults.
#[derive(Clone)]
pub struct BoundHandler {
    pub handler: Arc<dyn QueueHandler>,
    pub options: JobOptions,
}

/// Validate bindings for `queue_name` and index them by job name.
pub fn build_handler_map(
    queue_name: &str,
    bindings: Vec<HandlerBinding>,
    defaults: JobOptions,
) -> Result<BTreeMap<String, BoundHandler>, SchedulerError> {
    let mut map = BTreeMap::new();
    for binding in bindings {
        if binding.queue_name != queue_name {
            return Err(SchedulerError::Configuration(format!(
                "handler '{}' is bound to queue '{}', not '{}'",
                binding.job_name, binding.queue_name, queue_name
            )));
        }
        if map.contains_key(&binding.job_name) {
            return Err(SchedulerError::DuplicateHandler {
                queue: queue_name.to_string(),
                job_name: binding.job_name,
            });
        }
        map.insert(
            binding.job_name,
            BoundHandler {
                handler: binding.handler,
                options: binding.options.resolve(defaults),
            },
        );
    }
    Ok(map)
}

/// Worker host counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    unroutable: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub unroutable: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            unroutable: self.unroutable.load(Ordering::SeqCst),
        }
    }

    fn record(&self, outcome: RunOutcome) {
        let counter = match outcome {
            RunOutcome::Succeeded => &self.processed,
            RunOutcome::Failed => &self.failed,
            RunOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Consumes one named queue and routes messages to handlers by job name.
pub struct QueueWorkerHost {
    queue_name: String,
    queue: Arc<dyn DurableQueue>,
    handlers: BTreeMap<String, BoundHandler>,
    runner: JobRunner,
    concurrency: usize,
    poll_interval: Duration,
    stats: WorkerStats,
}

impl QueueWorkerHost {
    /// Build a host for `queue_name`. Fails on duplicate or foreign bindings.
    pub fn new(
        queue_name: impl Into<String>,
        bindings: Vec<HandlerBinding>,
        defaults: JobOptions,
        queue: Arc<dyn DurableQueue>,
        runner: JobRunner,
        config: &QueueConfig,
    ) -> Result<Self, SchedulerError> {
        let queue_name = queue_name.into();
        let handlers = build_handler_map(&queue_name, bindings, defaults)?;

        debug!(
            queue = %queue_name,
            handlers = ?handlers.keys().collect::<Vec<_>>(),
            "Worker host created"
        );

        Ok(Self {
            queue_name,
            queue,
            handlers,
            runner,
            concurrency: config.concurrency.max(1) as usize,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            stats: WorkerStats::default(),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Job names this host can handle, sorted.
    pub fn job_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Route one delivery to its handler.
    ///
    /// The delivery is acknowledged after any terminal outcome. A message no
    /// handler knows is negatively acknowledged so the broker redelivers it,
    /// possibly to a host with a newer handler set.
    pub async fn dispatch(&self, delivery: Delivery) -> Result<ExecutionReport, SchedulerError> {
        let message = &delivery.message;

        let Some(bound) = self.handlers.get(&message.job_name) else {
            let err = SchedulerError::UnroutableMessage {
                queue: self.queue_name.clone(),
                job_name: message.job_name.clone(),
                known: self.job_names(),
            };
            error!(queue = %self.queue_name, message_id = %message.id, "{}", err);
            self.stats.unroutable.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.queue.nack(&delivery).await {
                warn!(queue = %self.queue_name, message_id = %message.id, "Failed to nack: {}", e);
            }
            return Err(err);
        };

        let report = self
            .runner
            .run(&message.job_name, bound.options, |attempt| {
                let ctx = DeliveryContext::from_message(message, attempt);
                bound.handler.handle(message.payload.clone(), ctx)
            })
            .await;

        self.stats.record(report.outcome);
        if let Err(e) = self.queue.ack(&delivery).await {
            warn!(queue = %self.queue_name, message_id = %message.id, "Failed to ack: {}", e);
        }
        Ok(report)
    }

    /// Consume the queue until `cancel` fires, then wait for in-flight
    /// handlers to finish.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        match self.queue.recover(&self.queue_name).await {
            Ok(0) => {}
            Ok(n) => info!(queue = %self.queue_name, recovered = n, "Recovered abandoned deliveries"),
            Err(e) => warn!(queue = %self.queue_name, "Failed to recover deliveries: {}", e),
        }

        info!(
            queue = %self.queue_name,
            concurrency = self.concurrency,
            backend = self.queue.backend(),
            "Worker host started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let tracker = TaskTracker::new();
        let mut deliveries = Box::pin(consume(
            self.queue.clone(),
            self.queue_name.clone(),
            self.poll_interval,
            cancel.clone(),
        ));

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(delivery) = deliveries.next().await else {
                break;
            };

            let host = self.clone();
            tracker.spawn(async move {
                // Unroutable messages are already logged and nacked.
                let _ = host.dispatch(delivery).await;
                drop(permit);
            });
        }

        tracker.close();
        tracker.wait().await;
        info!(queue = %self.queue_name, stats = ?self.stats(), "Worker host stopped");
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
