//! Configuration validation.

use chrono_tz::Tz;

use crate::error::ConfigError;
use crate::schema::{Config, QueueBackend};

/// Retry counts above this produce a warning.
const HIGH_RETRY_WARNING: u32 = 100;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert into a `ConfigError` when any error was recorded.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.is_valid() {
            return Ok(self.warnings);
        }
        let message = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Invalid(message))
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_scheduler(config, &mut result);
        Self::validate_feature(config, &mut result);
        Self::validate_queue(config, &mut result);
        Self::validate_jobs(config, &mut result);

        Ok(result)
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        if scheduler.default_queue_name.trim().is_empty() {
            result.add_error(ValidationError::new(
                "scheduler.default_queue_name",
                "Default queue name cannot be empty",
            ));
        }

        if scheduler.default_timezone.parse::<Tz>().is_err() {
            result.add_error(ValidationError::new(
                "scheduler.default_timezone",
                format!("Unknown timezone '{}'", scheduler.default_timezone),
            ));
        }

        if scheduler.execution_timeout_ms == Some(0) {
            result.add_error(ValidationError::new(
                "scheduler.execution_timeout_ms",
                "Execution timeout must be greater than 0 (omit it for no timeout)",
            ));
        }

        if scheduler.default_job_options.retries > HIGH_RETRY_WARNING {
            result.add_warning(ValidationWarning::new(
                "scheduler.default_job_options.retries",
                "Retry count is very high, failing jobs will hold their overlap lock for a long time",
            ));
        }

        if !scheduler.enabled {
            result.add_warning(ValidationWarning::new(
                "scheduler.enabled",
                "Scheduler is disabled, jobs are registered but will not fire",
            ));
        }
    }

    fn validate_feature(config: &Config, result: &mut ValidationResult) {
        for (index, queue) in config.feature.queues.iter().enumerate() {
            if queue.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("feature.queues[{}]", index),
                    "Queue name cannot be empty",
                ));
            }
        }

        if !config.feature.queues.is_empty()
            && config.queue.backend == QueueBackend::Memory
            && !config.scheduler.enable_queueing
        {
            result.add_warning(ValidationWarning::new(
                "feature.queues",
                "Workers consume an in-memory queue that nothing in this process writes to",
            ));
        }
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        let queue = &config.queue;

        if queue.concurrency == 0 {
            result.add_error(ValidationError::new(
                "queue.concurrency",
                "Concurrency must be greater than 0",
            ));
        }

        if queue.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "queue.poll_interval_ms",
                "Poll interval must be greater than 0",
            ));
        }

        if queue.backend == QueueBackend::File && queue.path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "queue.path",
                "File backend requires a path",
            ));
        }

        if queue.visibility_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "queue.visibility_timeout_secs",
                "Visibility timeout of 0 redelivers every in-flight message on consumer start",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        for (name, job) in &config.jobs {
            if let Some(tz) = &job.timezone {
                if tz.parse::<Tz>().is_err() {
                    result.add_error(ValidationError::new(
                        format!("jobs.{}.timezone", name),
                        format!("Unknown timezone '{}'", tz),
                    ));
                }
            }

            if let Some(cron) = &job.cron {
                let fields = cron.split_whitespace().count();
                if fields != 5 && fields != 6 {
                    result.add_error(ValidationError::new(
                        format!("jobs.{}.cron", name),
                        format!("Expected 5 or 6 fields, got {}", fields),
                    ));
                }
            }

            if let Some(queue) = &job.queue_name {
                if queue.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("jobs.{}.queue_name", name),
                        "Queue name cannot be empty",
                    ));
                }
            }

            if job.retries.is_some_and(|r| r > HIGH_RETRY_WARNING) {
                result.add_warning(ValidationWarning::new(
                    format!("jobs.{}.retries", name),
                    "Retry count is very high",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
