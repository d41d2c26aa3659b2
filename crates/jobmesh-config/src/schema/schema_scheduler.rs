//! Scheduler defaults (`for_root` options).

use serde::{Deserialize, Serialize};

use super::default_true;

/// Process-wide scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Master switch for the local trigger engine.
    ///
    /// When false, jobs stay registered and introspectable but never fire.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether queue-bound jobs are dispatched to their queue.
    #[serde(default = "default_true")]
    pub enable_queueing: bool,

    /// Queue used by queue-bound jobs that do not name one.
    #[serde(default = "default_queue_name")]
    pub default_queue_name: String,

    /// IANA timezone for cron expressions without their own timezone.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default)]
    pub default_job_options: JobDefaults,

    /// What queue-bound jobs do when `enable_queueing` is false.
    #[serde(default)]
    pub queueing_disabled: QueueingDisabledPolicy,

    /// Upper bound for a single attempt. Unset means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_timeout_ms: Option<u64>,

    /// How long shutdown waits for in-flight executions.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_queue_name() -> String {
    "default".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            enable_queueing: default_true(),
            default_queue_name: default_queue_name(),
            default_timezone: default_timezone(),
            default_job_options: JobDefaults::default(),
            queueing_disabled: QueueingDisabledPolicy::default(),
            execution_timeout_ms: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Default overlap and retry options applied to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefaults {
    #[serde(default = "default_true")]
    pub prevent_overlap: bool,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            prevent_overlap: default_true(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Behaviour of queue-bound jobs while queueing is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueingDisabledPolicy {
    /// Execute the job body in the triggering process.
    #[default]
    RunLocally,
    /// Log and do not run the job.
    Skip,
}
