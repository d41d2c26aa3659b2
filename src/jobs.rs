//! Built-in job and handler providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use jobmesh_config::FeatureConfig;
use jobmesh_core::{Job, JobBinding, JobContext, JobDefinition, JobError, JobProvider, job_fn};
use jobmesh_scheduler::FeatureOptions;
use jobmesh_workqueue::{DeliveryContext, HandlerBinding, HandlerProvider, handler_fn};

pub(crate) const TIMESHEET_QUEUE: &str = "timesheets";

/// Liveness job: logs a beat every 30 seconds and once at startup.
#[derive(Default)]
pub(crate) struct HeartbeatJob {
    beats: AtomicU64,
}

#[async_trait]
impl Job for HeartbeatJob {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let beat = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        info!(job_name = %ctx.job_name, trigger = %ctx.trigger, beat, "Heartbeat");
        Ok(())
    }
}

pub(crate) struct HeartbeatJobs;

impl JobProvider for HeartbeatJobs {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn jobs(&self) -> Vec<JobBinding> {
        vec![JobBinding::new(
            JobDefinition::new("heartbeat")
                .cron("*/30 * * * * *")
                .run_on_start(true)
                .retries(1),
            Arc::new(HeartbeatJob::default()),
        )]
    }
}

/// Timesheet maintenance. The ticks are queue-bound so a fleet of
/// processes enqueues each period once and one worker handles it.
pub(crate) struct TimesheetJobs;

impl JobProvider for TimesheetJobs {
    fn name(&self) -> &str {
        "timesheets"
    }

    fn jobs(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobDefinition::new("timesheet-recalculate")
                    .cron("0 */15 * * * *")
                    .queue(TIMESHEET_QUEUE)
                    .queue_job_name("recalculate"),
                job_fn(|ctx| async move { recalculate(&ctx.payload, &ctx.job_name) }),
            ),
            JobBinding::new(
                JobDefinition::new("timesheet-close-period")
                    .cron("0 0 1 * *")
                    .queue(TIMESHEET_QUEUE)
                    .queue_job_name("close-period")
                    .retries(5)
                    .retry_delay_ms(60_000),
                job_fn(|ctx| async move { close_period(&ctx.payload, &ctx.job_name) }),
            ),
        ]
    }
}

/// Consumer side of [`TimesheetJobs`].
pub(crate) struct TimesheetHandlers;

impl HandlerProvider for TimesheetHandlers {
    fn name(&self) -> &str {
        "timesheets"
    }

    fn handlers(&self) -> Vec<HandlerBinding> {
        vec![
            HandlerBinding::new(
                TIMESHEET_QUEUE,
                "recalculate",
                handler_fn(|payload, ctx: DeliveryContext| async move {
                    recalculate(&payload, &ctx.job_name)
                }),
            ),
            HandlerBinding::new(
                TIMESHEET_QUEUE,
                "close-period",
                handler_fn(|payload, ctx: DeliveryContext| async move {
                    close_period(&payload, &ctx.job_name)
                }),
            )
            .retries(5)
            .retry_delay_ms(60_000),
        ]
    }
}

fn period(payload: &serde_json::Value) -> &str {
    payload
        .get("period")
        .and_then(|v| v.as_str())
        .unwrap_or("current")
}

fn recalculate(payload: &serde_json::Value, job_name: &str) -> Result<(), JobError> {
    info!(job_name, period = period(payload), "Recalculating timesheets");
    Ok(())
}

fn close_period(payload: &serde_json::Value, job_name: &str) -> Result<(), JobError> {
    let period = period(payload);
    if period.is_empty() {
        return Err(JobError::failed("empty period"));
    }
    info!(job_name, period, "Closing timesheet period");
    Ok(())
}

/// Built-in providers filtered by the feature selection, consuming `queues`.
pub(crate) fn builtin_feature(feature: &FeatureConfig, queues: Vec<String>) -> FeatureOptions {
    let mut options = FeatureOptions::new()
        .job_provider(Arc::new(HeartbeatJobs))
        .job_provider(Arc::new(TimesheetJobs))
        .handler_provider(Arc::new(TimesheetHandlers))
        .select(feature);
    options.queues = queues;
    options
}
