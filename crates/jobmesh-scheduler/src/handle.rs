//! Running scheduler handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobmesh_core::{JobRegistry, SchedulerError};
use jobmesh_workqueue::{DurableQueue, QueueDispatcher, QueueWorkerHost};

use crate::engine::{LocalTriggerEngine, NextFire, TriggerOutcome};

/// Assembled scheduler: trigger engine plus the worker hosts of this process.
pub struct Scheduler {
    engine: Arc<LocalTriggerEngine>,
    workers: Vec<Arc<QueueWorkerHost>>,
    dispatcher: Option<QueueDispatcher>,
    queue: Option<Arc<dyn DurableQueue>>,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn new(
        engine: Arc<LocalTriggerEngine>,
        workers: Vec<Arc<QueueWorkerHost>>,
        dispatcher: Option<QueueDispatcher>,
        queue: Option<Arc<dyn DurableQueue>>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            workers,
            dispatcher,
            queue,
            shutdown_timeout,
            cancel: CancellationToken::new(),
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.engine.registry()
    }

    pub fn engine(&self) -> &Arc<LocalTriggerEngine> {
        &self.engine
    }

    pub fn workers(&self) -> &[Arc<QueueWorkerHost>] {
        &self.workers
    }

    /// Present only when queueing is enabled and a broker is open.
    pub fn dispatcher(&self) -> Option<&QueueDispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn queue(&self) -> Option<&Arc<dyn DurableQueue>> {
        self.queue.as_ref()
    }

    pub fn next_fire_times(&self) -> Vec<NextFire> {
        self.engine.next_fire_times()
    }

    /// Fire run-on-start jobs and arm cron timers.
    pub fn start_triggers(&self) {
        self.engine.start();
    }

    /// Start one consumer loop per worker host. Calling it twice is a no-op.
    pub fn start_workers(&self) {
        let mut handles = self.worker_handles.lock();
        if !handles.is_empty() {
            return;
        }
        for worker in &self.workers {
            handles.push(tokio::spawn(worker.clone().run(self.cancel.child_token())));
        }
    }

    /// Start triggers and workers.
    pub fn start(&self) {
        self.start_triggers();
        self.start_workers();
    }

    /// Manually fire a registered job.
    pub async fn trigger(&self, name: &str) -> Result<TriggerOutcome, SchedulerError> {
        self.engine.trigger(name).await
    }

    pub async fn trigger_with(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<TriggerOutcome, SchedulerError> {
        self.engine.trigger_with(name, payload).await
    }

    /// Stop triggers and consumers, waiting for in-flight work up to the
    /// configured shutdown timeout. Returns false if work was still running
    /// when the timeout elapsed.
    pub async fn shutdown(&self) -> bool {
        info!(timeout_secs = self.shutdown_timeout.as_secs(), "Scheduler shutting down");
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;

        self.cancel.cancel();
        let engine_done = self.engine.shutdown(self.shutdown_timeout).await;

        let handles: Vec<_> = self.worker_handles.lock().drain(..).collect();
        let mut workers_done = true;
        for handle in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker host task failed: {}", e),
                Err(_) => {
                    workers_done = false;
                    warn!("Worker host still busy at shutdown timeout");
                }
            }
        }

        let clean = engine_done && workers_done;
        info!(clean, "Scheduler stopped");
        clean
    }
}
