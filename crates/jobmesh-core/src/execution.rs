//! Execution records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Pending,
    Succeeded,
    Failed,
}

/// One attempt of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_name: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: ExecutionOutcome,
    /// Present iff the outcome is `Failed`.
    pub error: Option<String>,
}

impl JobExecution {
    pub fn start(job_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            job_name: job_name.into(),
            attempt,
            started_at: Utc::now(),
            outcome: ExecutionOutcome::Pending,
            error: None,
        }
    }

    pub fn succeed(&mut self) {
        self.outcome = ExecutionOutcome::Succeeded;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.outcome = ExecutionOutcome::Failed;
        self.error = Some(error.into());
    }
}

/// Final result of a guarded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    /// Every allowed attempt failed.
    Failed,
    /// The overlap guard refused the run.
    Skipped,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Summary of all attempts of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub job_name: String,
    pub outcome: RunOutcome,
    pub attempts: Vec<JobExecution>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn skipped(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            outcome: RunOutcome::Skipped,
            attempts: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Error of the last failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.last().and_then(|a| a.error.as_deref())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
