//! Error types for the scheduling core.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while configuring or running scheduled work.
///
/// Configuration variants abort startup; the rest are recoverable and are
/// reported through the logging sink instead of crashing the host process.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A descriptor with this name is already registered.
    #[error("Duplicate job name: {0}")]
    DuplicateJobName(String),

    /// The cron expression could not be parsed.
    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The timezone is not a known IANA name.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No descriptor with this name.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Two handlers on the same worker host claim the same job name.
    #[error("Duplicate handler for job '{job_name}' on queue '{queue}'")]
    DuplicateHandler { queue: String, job_name: String },

    /// A queue message names a job no handler on this host knows.
    #[error("Unroutable message for job '{job_name}' on queue '{queue}' (known handlers: {known:?})")]
    UnroutableMessage {
        queue: String,
        job_name: String,
        known: Vec<String>,
    },

    /// The overlap guard refused the execution. Not a failure.
    #[error("Execution of '{0}' skipped: previous run still in flight")]
    OverlapDenied(String),

    /// The message could not be handed to the broker.
    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    /// A single attempt of a job body failed.
    #[error("Job '{job_name}' failed on attempt {attempt}: {message}")]
    JobBodyFailed {
        job_name: String,
        attempt: u32,
        message: String,
    },

    /// Every allowed attempt failed.
    #[error("Job '{job_name}' failed permanently after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        job_name: String,
        attempts: u32,
        last_error: String,
    },

    /// Any other invalid module configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SchedulerError {
    /// Whether this error should prevent the process from starting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::DuplicateJobName(_)
                | SchedulerError::InvalidSchedule { .. }
                | SchedulerError::InvalidTimezone(_)
                | SchedulerError::DuplicateHandler { .. }
                | SchedulerError::Configuration(_)
        )
    }
}

impl From<jobmesh_config::ConfigError> for SchedulerError {
    fn from(err: jobmesh_config::ConfigError) -> Self {
        SchedulerError::Configuration(err.to_string())
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error returned by a job body or queue handler.
#[derive(Debug, Error)]
pub enum JobError {
    /// The body reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The attempt exceeded the configured execution timeout.
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    /// The body panicked.
    #[error("Panicked: {0}")]
    Panicked(String),

    /// Handing the job to its queue failed.
    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),
}

impl JobError {
    /// Create a failure from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Failed(err.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Failed(err.to_string())
    }
}
