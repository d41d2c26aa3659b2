//! CronTimer - per-job timer driven by a cron schedule.
//!
//! The timer sleeps until the next occurrence, re-arms for the following
//! one and hands the tick to a callback. The callback must not block: the
//! engine spawns the execution so a long-running job never delays the next
//! tick computation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use jobmesh_core::CronSchedule;

/// Cron expression based timer for one job.
pub struct CronTimer {
    job_name: String,
    schedule: CronSchedule,
    valid: AtomicBool,
    fire_count: AtomicU64,
}

impl CronTimer {
    pub fn new(job_name: impl Into<String>, schedule: CronSchedule) -> Arc<Self> {
        Arc::new(Self {
            job_name: job_name.into(),
            schedule,
            valid: AtomicBool::new(true),
            fire_count: AtomicU64::new(0),
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn cron_expr(&self) -> &str {
        self.schedule.expression()
    }

    /// Check if the timer is valid (not cancelled).
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    /// Cancel the timer. No further ticks are delivered.
    pub fn cancel(&self) {
        self.valid.store(false, Ordering::SeqCst);
        debug!(job_name = %self.job_name, "CronTimer cancelled");
    }

    /// Get the next scheduled time.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_valid() {
            return None;
        }
        self.schedule.next()
    }

    /// Deliver ticks to `on_fire` until cancelled or the schedule runs out.
    pub async fn run<F>(self: Arc<Self>, cancel: CancellationToken, mut on_fire: F)
    where
        F: FnMut(DateTime<Utc>) + Send,
    {
        let mut last: Option<DateTime<Utc>> = None;

        while self.is_valid() {
            let now = Utc::now();
            // Never hand out the same tick twice when the sleep wakes early.
            let after = match last {
                Some(last) if last > now => last,
                _ => now,
            };

            let Some(next) = self.schedule.next_after(after) else {
                debug!(job_name = %self.job_name, "CronTimer has no upcoming schedule");
                break;
            };

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(job_name = %self.job_name, next = %next.to_rfc3339(), "CronTimer armed");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if !self.is_valid() {
                break;
            }

            last = Some(next);
            self.fire_count.fetch_add(1, Ordering::Relaxed);
            on_fire(next);
        }
    }
}
