//! `jobs`, `enqueue` and `validate` subcommands.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use jobmesh_config::{Config, ConfigLoader, ConfigValidator};
use jobmesh_core::{JobRegistry, JobRunner, OverlapGuard, SchedulerError};
use jobmesh_scheduler::{LocalTriggerEngine, NextFire};
use jobmesh_workqueue::{open_queue, EnqueueReceipt, QueueDispatcher};

use crate::jobs::builtin_feature;

/// Registry of the built-in jobs the configuration enables.
fn registry(config: &Config) -> Result<JobRegistry, SchedulerError> {
    let feature = builtin_feature(&config.feature, Vec::new());
    let mut registry = JobRegistry::new(config.scheduler.clone()).with_overrides(config.jobs.clone());
    for provider in &feature.job_providers {
        registry.register_provider(provider.as_ref())?;
    }
    Ok(registry)
}

/// Print registered jobs with their next fire time.
pub(crate) fn list_jobs(config: &Config, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = registry(config)?;
    let engine = LocalTriggerEngine::new(
        Arc::new(registry),
        JobRunner::new(Arc::new(OverlapGuard::new())),
        None,
    );
    let rows = engine.next_fire_times();

    if rows.is_empty() {
        println!("No jobs registered.");
        return Ok(());
    }

    match format {
        "json" => {
            let json: Vec<_> = rows.iter().map(row_json).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!(
                "{:<26} {:<18} {:<12} {:<8} {:<14} {}",
                "NAME", "CRON", "TIMEZONE", "ENABLED", "TARGET", "NEXT"
            );
            println!("{}", "-".repeat(100));
            for row in &rows {
                let descriptor = engine.registry().lookup(&row.job_name)?;
                let target = descriptor
                    .is_queued()
                    .then(|| descriptor.queue_name().unwrap_or(&config.scheduler.default_queue_name))
                    .unwrap_or("local");
                println!(
                    "{:<26} {:<18} {:<12} {:<8} {:<14} {}",
                    row.job_name,
                    row.cron_expression.as_deref().unwrap_or("-"),
                    row.timezone,
                    descriptor.is_enabled(),
                    target,
                    row.next.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
                );
            }
            if !config.scheduler.enabled {
                println!();
                println!("Scheduler disabled: no triggers will fire.");
            }
        }
    }

    Ok(())
}

fn row_json(row: &NextFire) -> serde_json::Value {
    serde_json::json!({
        "name": row.job_name,
        "cron": row.cron_expression,
        "timezone": row.timezone,
        "next": row.next.map(|t| t.to_rfc3339()),
    })
}

/// Push one message for `job` onto its queue.
///
/// A registered queue-bound job name resolves to its queue and message job
/// name; anything else is sent as-is to `queue` or the default queue.
pub(crate) async fn enqueue(
    config: &Config,
    job: &str,
    queue: Option<&str>,
    payload: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match payload {
        Some(text) => serde_json::from_str(text)?,
        None => serde_json::Value::Null,
    };

    let broker = open_queue(&config.queue).await?;
    let dispatcher = QueueDispatcher::new(broker, config.scheduler.default_queue_name.clone());
    let registry = registry(config)?;
    let tick = Utc::now();

    let receipt = match (registry.lookup(job), queue) {
        (Ok(descriptor), None) if descriptor.is_queued() => {
            dispatcher.enqueue(descriptor, payload, tick).await?
        }
        (_, queue) => {
            let queue = queue.unwrap_or(dispatcher.default_queue_name()).to_string();
            dispatcher.enqueue_to(&queue, job, payload, tick).await?
        }
    };

    match receipt {
        EnqueueReceipt::Enqueued { message_id } => {
            info!(job_name = job, %message_id, "Message enqueued");
            println!("Enqueued {} ({})", job, message_id);
        }
        EnqueueReceipt::Duplicate { dedup_key } => {
            println!("Duplicate of {}; nothing enqueued", dedup_key);
        }
    }
    Ok(())
}

/// Load and validate the configuration, including every job definition.
pub(crate) fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load(path)?;
    let result = ConfigValidator::validate(&config)?;

    for warning in &result.warnings {
        warn!(path = %warning.path, "{}", warning.message);
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }
    result.into_result()?;

    let registry = registry(&config)?;
    println!("{}: ok ({} jobs)", path.display(), registry.len());
    Ok(())
}
