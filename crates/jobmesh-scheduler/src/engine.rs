//! Local trigger engine.
//!
//! Fires registered jobs on their cron schedule and once at startup, then
//! either runs them in-process through the [`JobRunner`] or hands them to the
//! [`QueueDispatcher`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use jobmesh_config::{QueueingDisabledPolicy, SchedulerConfig};
use jobmesh_core::{
    ExecutionReport, JobContext, JobError, JobRegistry, JobRunner, RegisteredJob, RunOutcome,
    SchedulerError, Trigger,
};
use jobmesh_workqueue::{EnqueueReceipt, QueueDispatcher};

use crate::cron_timer::CronTimer;

/// Result of firing one job.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// The body ran in this process.
    Ran(ExecutionReport),
    /// The job was handed to its queue. `receipt` is `None` when every
    /// enqueue attempt failed.
    Dispatched {
        report: ExecutionReport,
        receipt: Option<EnqueueReceipt>,
    },
    /// Nothing ran: the job is disabled or queue-bound while queueing is off
    /// with the `skip` policy.
    NotRun { reason: String },
}

impl TriggerOutcome {
    /// Outcome of the guarded run, if one happened.
    pub fn run_outcome(&self) -> Option<RunOutcome> {
        match self {
            TriggerOutcome::Ran(report) | TriggerOutcome::Dispatched { report, .. } => {
                Some(report.outcome)
            }
            TriggerOutcome::NotRun { .. } => None,
        }
    }
}

/// Upcoming fire time of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextFire {
    pub job_name: String,
    pub cron_expression: Option<String>,
    pub timezone: String,
    /// `None` when the job has no schedule, is disabled or the engine is off.
    pub next: Option<DateTime<Utc>>,
}

/// Drives local triggers for every registered job.
pub struct LocalTriggerEngine {
    registry: Arc<JobRegistry>,
    runner: JobRunner,
    dispatcher: Option<QueueDispatcher>,
    config: SchedulerConfig,
    timers: Mutex<Vec<Arc<CronTimer>>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl LocalTriggerEngine {
    /// Create an engine. `dispatcher` is only used when queueing is enabled.
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: JobRunner,
        dispatcher: Option<QueueDispatcher>,
    ) -> Self {
        let config = registry.config().clone();
        Self {
            registry,
            runner,
            dispatcher,
            config,
            timers: Mutex::new(Vec::new()),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Executions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Fire run-on-start jobs and arm cron timers.
    ///
    /// A disabled engine does nothing. Calling `start` twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!(jobs = self.registry.len(), "Scheduler disabled; no triggers will fire");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let now = Utc::now();
        for entry in self.registry.entries() {
            let descriptor = &entry.descriptor;
            if !descriptor.is_enabled() {
                debug!(job_name = descriptor.name(), "Job disabled; not armed");
                continue;
            }
            if descriptor.run_on_start() {
                self.spawn_fire(descriptor.name().to_string(), Trigger::Startup, now);
            }
        }

        let mut timers = self.timers.lock();
        for entry in self.registry.entries() {
            let descriptor = &entry.descriptor;
            let Some(schedule) = descriptor.schedule().filter(|_| descriptor.is_enabled()) else {
                continue;
            };

            let timer = CronTimer::new(descriptor.name(), schedule.clone());
            let engine = self.clone();
            let job_name = descriptor.name().to_string();
            self.tracker.spawn(timer.clone().run(self.cancel.child_token(), move |tick| {
                engine.spawn_fire(job_name.clone(), Trigger::Cron, tick);
            }));
            timers.push(timer);
        }

        info!(
            jobs = self.registry.len(),
            timers = timers.len(),
            "Local trigger engine started"
        );
    }

    fn spawn_fire(self: &Arc<Self>, job_name: String, trigger: Trigger, tick: DateTime<Utc>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let engine = self.clone();
        self.tracker.spawn(async move {
            if let Some(entry) = engine.registry.get(&job_name) {
                engine
                    .execute(entry, trigger, tick, serde_json::Value::Null)
                    .await;
            }
        });
    }

    /// Run `name` now through the same path as a scheduled tick.
    pub async fn trigger(&self, name: &str) -> Result<TriggerOutcome, SchedulerError> {
        self.trigger_with(name, serde_json::Value::Null).await
    }

    /// Like [`trigger`](Self::trigger) with an explicit payload.
    pub async fn trigger_with(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<TriggerOutcome, SchedulerError> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?;
        Ok(self.execute(entry, Trigger::Manual, Utc::now(), payload).await)
    }

    async fn execute(
        &self,
        entry: &RegisteredJob,
        trigger: Trigger,
        tick: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> TriggerOutcome {
        let descriptor = &entry.descriptor;
        let name = descriptor.name();

        if !descriptor.is_enabled() {
            return TriggerOutcome::NotRun {
                reason: format!("job '{}' is disabled", name),
            };
        }

        debug!(job_name = name, %trigger, tick = %tick.to_rfc3339(), "Job fired");

        if descriptor.is_queued() {
            match (&self.dispatcher, self.config.enable_queueing) {
                (Some(dispatcher), true) => {
                    return self.dispatch(dispatcher, entry, payload, tick).await;
                }
                _ if self.config.queueing_disabled == QueueingDisabledPolicy::Skip => {
                    info!(job_name = name, "Queueing disabled; skipping queue-bound job");
                    return TriggerOutcome::NotRun {
                        reason: "queueing disabled".to_string(),
                    };
                }
                _ => {
                    debug!(job_name = name, "Queueing disabled; running queue-bound job locally");
                }
            }
        }

        let ctx = JobContext::new(name, trigger, tick).with_payload(payload);
        let job = &entry.job;
        let report = self
            .runner
            .run(name, descriptor.options(), |attempt| job.run(ctx.for_attempt(attempt)))
            .await;
        TriggerOutcome::Ran(report)
    }

    /// Enqueue with the job's retry policy. The overlap guard is not taken:
    /// the consumer side applies it.
    async fn dispatch(
        &self,
        dispatcher: &QueueDispatcher,
        entry: &RegisteredJob,
        payload: serde_json::Value,
        tick: DateTime<Utc>,
    ) -> TriggerOutcome {
        let descriptor = &entry.descriptor;
        let receipt = Mutex::new(None);

        let report = self
            .runner
            .run_unguarded(
                descriptor.name(),
                descriptor.options().retry_policy(),
                |_attempt| {
                    let receipt = &receipt;
                    let payload = payload.clone();
                    async move {
                        let r = dispatcher
                            .enqueue(descriptor, payload, tick)
                            .await
                            .map_err(|e| JobError::EnqueueFailed(e.to_string()))?;
                        *receipt.lock() = Some(r);
                        Ok::<(), JobError>(())
                    }
                },
            )
            .await;

        TriggerOutcome::Dispatched {
            report,
            receipt: receipt.into_inner(),
        }
    }

    /// Next fire time of every registered job, ordered by name.
    pub fn next_fire_times(&self) -> Vec<NextFire> {
        self.registry
            .all()
            .map(|descriptor| NextFire {
                job_name: descriptor.name().to_string(),
                cron_expression: descriptor.cron_expression().map(str::to_string),
                timezone: descriptor.timezone().to_string(),
                next: descriptor
                    .schedule()
                    .filter(|_| self.config.enabled && descriptor.is_enabled())
                    .and_then(|s| s.next()),
            })
            .collect()
    }

    /// Stop arming timers and wait up to `timeout` for in-flight executions.
    ///
    /// Running bodies are not cancelled. Returns false if the timeout
    /// elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        for timer in self.timers.lock().drain(..) {
            timer.cancel();
        }
        self.tracker.close();

        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight executions");
        }

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Local trigger engine stopped");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.tracker.len(),
                    timeout_secs = timeout.as_secs(),
                    "Shutdown timed out with executions still running"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
