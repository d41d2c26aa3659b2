//! Guarded, retrying execution of job bodies.
//!
//! Both local triggers and queue deliveries go through [`JobRunner`]: it
//! takes the overlap guard, runs attempts until one succeeds or the retry
//! policy gives up, and releases the guard afterwards. Errors never escape
//! the runner; they end up in the [`ExecutionReport`] and the log.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::descriptor::JobOptions;
use crate::error::{JobError, SchedulerError};
use crate::execution::{ExecutionReport, JobExecution, RunOutcome};
use crate::overlap::OverlapGuard;
use crate::retry::RetryPolicy;

/// Runs job bodies under the overlap guard and retry policy.
#[derive(Debug, Clone)]
pub struct JobRunner {
    guard: Arc<OverlapGuard>,
    timeout: Option<Duration>,
}

impl JobRunner {
    pub fn new(guard: Arc<OverlapGuard>) -> Self {
        Self {
            guard,
            timeout: None,
        }
    }

    /// Bound every attempt to `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn guard(&self) -> &Arc<OverlapGuard> {
        &self.guard
    }

    /// Run `attempt_fn` under the guard for `job_name`.
    ///
    /// `attempt_fn` receives the attempt number (from 1). The guard stays
    /// held across retry delays so ticks of one job never interleave.
    pub async fn run<F, Fut>(
        &self,
        job_name: &str,
        options: JobOptions,
        attempt_fn: F,
    ) -> ExecutionReport
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), JobError>>,
    {
        let Some(_permit) = self.guard.acquire(job_name, options.prevent_overlap) else {
            let denied = SchedulerError::OverlapDenied(job_name.to_string());
            warn!(job_name, "{}", denied);
            return ExecutionReport::skipped(job_name);
        };

        self.run_attempts(job_name, options.retry_policy(), attempt_fn).await
    }

    /// Run `attempt_fn` with retries but without touching the guard.
    pub async fn run_unguarded<F, Fut>(
        &self,
        job_name: &str,
        policy: RetryPolicy,
        attempt_fn: F,
    ) -> ExecutionReport
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), JobError>>,
    {
        self.run_attempts(job_name, policy, attempt_fn).await
    }

    async fn run_attempts<F, Fut>(
        &self,
        job_name: &str,
        policy: RetryPolicy,
        mut attempt_fn: F,
    ) -> ExecutionReport
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), JobError>>,
    {
        let started = Instant::now();
        let mut attempts = Vec::new();
        let mut attempt = 1;

        loop {
            let mut execution = JobExecution::start(job_name, attempt);
            let attempt_started = Instant::now();
            info!(job_name, attempt, "Job started");

            let result = self.run_once(attempt_fn(attempt)).await;
            let elapsed_ms = attempt_started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    execution.succeed();
                    attempts.push(execution);
                    info!(job_name, attempt, elapsed_ms, "Job succeeded");
                    return ExecutionReport {
                        job_name: job_name.to_string(),
                        outcome: RunOutcome::Succeeded,
                        attempts,
                        elapsed: started.elapsed(),
                    };
                }
                Err(e) => {
                    let failure = SchedulerError::JobBodyFailed {
                        job_name: job_name.to_string(),
                        attempt,
                        message: e.to_string(),
                    };
                    execution.fail(e.to_string());
                    attempts.push(execution);

                    if policy.should_retry(attempt) {
                        let delay = policy.next_delay(attempt);
                        warn!(
                            job_name,
                            attempt,
                            elapsed_ms,
                            retry_in_ms = delay.as_millis() as u64,
                            "{}",
                            failure
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let exhausted = SchedulerError::RetriesExhausted {
                        job_name: job_name.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    };
                    error!(job_name, attempt, elapsed_ms, "{}", exhausted);
                    return ExecutionReport {
                        job_name: job_name.to_string(),
                        outcome: RunOutcome::Failed,
                        attempts,
                        elapsed: started.elapsed(),
                    };
                }
            }
        }
    }

    /// One attempt with panic capture and the optional timeout.
    async fn run_once<Fut>(&self, fut: Fut) -> Result<(), JobError>
    where
        Fut: Future<Output = Result<(), JobError>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(timeout_ms = limit.as_millis() as u64, "Attempt timed out");
                    return Err(JobError::TimedOut(limit));
                }
            },
            None => guarded.await,
        };

        outcome.unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(&*panic))))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
