//! Durable queue backend configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Queue broker and consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Root directory of the file backend.
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,

    /// Maximum in-flight handler invocations per worker host.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Delay between polls of an empty queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a dedup key blocks a second enqueue.
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Age after which an unacknowledged delivery is handed out again.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

/// Broker implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// In-process queue, lost on exit.
    #[default]
    Memory,
    /// Directory-backed queue shared between processes.
    File,
}

fn default_queue_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jobmesh")
        .join("queues")
}

fn default_concurrency() -> u32 {
    4
}

fn default_poll_interval() -> u64 {
    250
}

fn default_dedup_window() -> u64 {
    3600
}

fn default_visibility_timeout() -> u64 {
    300
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            path: default_queue_path(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            dedup_window_secs: default_dedup_window(),
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}
