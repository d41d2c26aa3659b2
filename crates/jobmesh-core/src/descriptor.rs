//! Job definitions and resolved descriptors.
//!
//! A [`JobDefinition`] is what a job provider declares: everything except
//! the name is optional. Registration resolves it against the global
//! defaults into an immutable [`JobDescriptor`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use jobmesh_config::{JobDefaults, JobOverride, SchedulerConfig};

use crate::error::SchedulerError;
use crate::retry::RetryPolicy;
use crate::schedule::CronSchedule;

/// Overlap and retry options of a job or queue handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub prevent_overlap: bool,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl JobOptions {
    /// The retry policy these options describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retries, Duration::from_millis(self.retry_delay_ms))
    }
}

impl From<JobDefaults> for JobOptions {
    fn from(defaults: JobDefaults) -> Self {
        Self {
            prevent_overlap: defaults.prevent_overlap,
            retries: defaults.retries,
            retry_delay_ms: defaults.retry_delay_ms,
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        JobDefaults::default().into()
    }
}

/// Partial overrides of [`JobOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptionsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_overlap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl JobOptionsOverride {
    /// Fill unset fields from `defaults`.
    pub fn resolve(&self, defaults: JobOptions) -> JobOptions {
        JobOptions {
            prevent_overlap: self.prevent_overlap.unwrap_or(defaults.prevent_overlap),
            retries: self.retries.unwrap_or(defaults.retries),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
        }
    }
}

/// Queue binding of a job definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTarget {
    /// Queue to dispatch to; `None` means the default queue.
    pub queue_name: Option<String>,
    /// Message discriminator; `None` means the job name.
    pub job_name: Option<String>,
}

/// Declarative job metadata supplied by a job provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub enabled: bool,
    pub run_on_start: bool,
    pub options: JobOptionsOverride,
    pub queue: Option<QueueTarget>,
}

impl JobDefinition {
    /// Create a definition with no schedule and default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron_expression: None,
            timezone: None,
            enabled: true,
            run_on_start: false,
            options: JobOptionsOverride::default(),
            queue: None,
        }
    }

    /// Set the cron expression (5 or 6 fields).
    pub fn cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    /// Set the timezone the cron expression is evaluated in.
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fire once at startup before entering the cron loop.
    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn prevent_overlap(mut self, prevent_overlap: bool) -> Self {
        self.options.prevent_overlap = Some(prevent_overlap);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retries = Some(retries);
        self
    }

    pub fn retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.options.retry_delay_ms = Some(retry_delay_ms);
        self
    }

    /// Dispatch through the default queue instead of running locally.
    pub fn queued(mut self) -> Self {
        self.queue.get_or_insert_with(QueueTarget::default);
        self
    }

    /// Dispatch through the named queue instead of running locally.
    pub fn queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue.get_or_insert_with(QueueTarget::default).queue_name = Some(queue_name.into());
        self
    }

    /// Message discriminator used by the consuming worker host.
    pub fn queue_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.queue.get_or_insert_with(QueueTarget::default).job_name = Some(job_name.into());
        self
    }

    /// Apply a configuration override on top of this definition.
    pub fn with_override(mut self, over: &JobOverride) -> Self {
        if let Some(enabled) = over.enabled {
            self.enabled = enabled;
        }
        if let Some(cron) = &over.cron {
            self.cron_expression = Some(cron.clone());
        }
        if let Some(timezone) = &over.timezone {
            self.timezone = Some(timezone.clone());
        }
        if let Some(run_on_start) = over.run_on_start {
            self.run_on_start = run_on_start;
        }
        if over.prevent_overlap.is_some() {
            self.options.prevent_overlap = over.prevent_overlap;
        }
        if over.retries.is_some() {
            self.options.retries = over.retries;
        }
        if over.retry_delay_ms.is_some() {
            self.options.retry_delay_ms = over.retry_delay_ms;
        }
        if let Some(queue_name) = &over.queue_name {
            self = self.queue(queue_name.clone());
        }
        self
    }

    /// Validate and resolve against the global defaults.
    pub fn resolve(self, config: &SchedulerConfig) -> Result<JobDescriptor, SchedulerError> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::Configuration(
                "job name cannot be empty".to_string(),
            ));
        }

        let timezone = self
            .timezone
            .clone()
            .unwrap_or_else(|| config.default_timezone.clone());

        let schedule = match &self.cron_expression {
            Some(expression) => Some(CronSchedule::parse(expression, &timezone)?),
            None => {
                crate::schedule::parse_timezone(&timezone)?;
                None
            }
        };

        let options = self.options.resolve(config.default_job_options.into());

        let (queue_name, queue_job_name) = match self.queue {
            Some(target) => (
                Some(
                    target
                        .queue_name
                        .unwrap_or_else(|| config.default_queue_name.clone()),
                ),
                target.job_name.unwrap_or_else(|| self.name.clone()),
            ),
            None => (None, self.name.clone()),
        };

        Ok(JobDescriptor {
            name: self.name,
            schedule,
            timezone,
            enabled: self.enabled,
            run_on_start: self.run_on_start,
            options,
            queue_name,
            queue_job_name,
        })
    }
}

/// Immutable, validated job metadata.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    name: String,
    schedule: Option<CronSchedule>,
    timezone: String,
    enabled: bool,
    run_on_start: bool,
    options: JobOptions,
    queue_name: Option<String>,
    queue_job_name: String,
}

impl JobDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed schedule, if the job is cron-driven.
    pub fn schedule(&self) -> Option<&CronSchedule> {
        self.schedule.as_ref()
    }

    pub fn cron_expression(&self) -> Option<&str> {
        self.schedule.as_ref().map(|s| s.expression())
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn run_on_start(&self) -> bool {
        self.run_on_start
    }

    pub fn options(&self) -> JobOptions {
        self.options
    }

    pub fn prevent_overlap(&self) -> bool {
        self.options.prevent_overlap
    }

    pub fn retries(&self) -> u32 {
        self.options.retries
    }

    pub fn retry_delay_ms(&self) -> u64 {
        self.options.retry_delay_ms
    }

    /// Queue this job dispatches to; `None` means it runs locally.
    pub fn queue_name(&self) -> Option<&str> {
        self.queue_name.as_deref()
    }

    pub fn is_queued(&self) -> bool {
        self.queue_name.is_some()
    }

    /// Discriminator written into queue messages.
    pub fn queue_job_name(&self) -> &str {
        &self.queue_job_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            default_queue_name: "background".to_string(),
            default_timezone: "Europe/Berlin".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let descriptor = JobDefinition::new("heartbeat")
            .cron("*/30 * * * * *")
            .resolve(&config())
            .unwrap();

        assert_eq!(descriptor.name(), "heartbeat");
        assert_eq!(descriptor.timezone(), "Europe/Berlin");
        assert!(descriptor.is_enabled());
        assert!(!descriptor.run_on_start());
        assert!(descriptor.prevent_overlap());
        assert_eq!(descriptor.retries(), 3);
        assert_eq!(descriptor.retry_delay_ms(), 5000);
        assert!(!descriptor.is_queued());
        assert_eq!(descriptor.queue_job_name(), "heartbeat");
    }

    #[test]
    fn test_resolve_explicit_options() {
        let descriptor = JobDefinition::new("heartbeat")
            .cron("*/30 * * * * *")
            .timezone("UTC")
            .prevent_overlap(false)
            .retries(1)
            .retry_delay_ms(5000)
            .resolve(&config())
            .unwrap();

        assert_eq!(descriptor.timezone(), "UTC");
        assert!(!descriptor.prevent_overlap());
        assert_eq!(descriptor.retries(), 1);
        assert_eq!(descriptor.options().retry_policy().max_attempts(), 2);
    }

    #[test]
    fn test_queued_uses_default_queue() {
        let descriptor = JobDefinition::new("recalc")
            .queued()
            .resolve(&config())
            .unwrap();
        assert_eq!(descriptor.queue_name(), Some("background"));
        assert_eq!(descriptor.queue_job_name(), "recalc");
    }

    #[test]
    fn test_named_queue_and_discriminator() {
        let descriptor = JobDefinition::new("timesheet-trigger")
            .queue("timesheets")
            .queue_job_name("recalculate")
            .resolve(&config())
            .unwrap();
        assert_eq!(descriptor.queue_name(), Some("timesheets"));
        assert_eq!(descriptor.queue_job_name(), "recalculate");
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let err = JobDefinition::new("bad")
            .cron("not a cron")
            .resolve(&config())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
    }

    #[test]
    fn test_invalid_timezone_rejected_without_cron() {
        let err = JobDefinition::new("startup")
            .timezone("Nowhere/Land")
            .run_on_start(true)
            .resolve(&config())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTimezone(_)));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(JobDefinition::new(" ").resolve(&config()).is_err());
    }

    #[test]
    fn test_with_override() {
        let over = JobOverride {
            enabled: Some(false),
            cron: Some("0 0 * * *".to_string()),
            retries: Some(7),
            queue_name: Some("nightly".to_string()),
            ..Default::default()
        };
        let descriptor = JobDefinition::new("report")
            .cron("0 * * * *")
            .retries(1)
            .with_override(&over)
            .resolve(&config())
            .unwrap();

        assert!(!descriptor.is_enabled());
        assert_eq!(descriptor.cron_expression(), Some("0 0 * * *"));
        assert_eq!(descriptor.retries(), 7);
        assert_eq!(descriptor.queue_name(), Some("nightly"));
    }

    #[test]
    fn test_options_override_resolve() {
        let over = JobOptionsOverride {
            retries: Some(0),
            ..Default::default()
        };
        let resolved = over.resolve(JobOptions::default());
        assert_eq!(resolved.retries, 0);
        assert!(resolved.prevent_overlap);
        assert_eq!(resolved.retry_delay_ms, 5000);
    }
}
