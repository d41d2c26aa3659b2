//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

mod schema_queue;
mod schema_scheduler;

pub use schema_queue::*;
pub use schema_scheduler::*;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Process-wide scheduler defaults (`for_root`).
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Providers and queues active in this process (`for_feature`).
    #[serde(default)]
    pub feature: FeatureConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    /// Per-job overrides keyed by job name.
    #[serde(default)]
    pub jobs: HashMap<String, JobOverride>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feature selection for this process.
///
/// An empty `providers` list activates every built-in provider. An empty
/// `queues` list makes the process triggers-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub providers: Vec<String>,

    #[serde(default)]
    pub queues: Vec<String>,
}

impl FeatureConfig {
    /// Whether the named provider is active.
    pub fn provider_enabled(&self, name: &str) -> bool {
        self.providers.is_empty() || self.providers.iter().any(|p| p == name)
    }
}

/// Override of a declared job's metadata, applied before registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_on_start: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_overlap: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Write a daily-rotated log file in addition to the console.
    #[serde(default = "default_true")]
    pub file_enabled: bool,

    /// Log directory (defaults to `~/.jobmesh/logs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file_enabled: default_true(),
            dir: None,
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
