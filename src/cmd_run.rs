//! `run` subcommand.

use tracing::{info, warn};

use jobmesh_config::Config;
use jobmesh_scheduler::SchedulerModule;

use crate::cli::RunMode;
use crate::jobs::builtin_feature;

/// Start the scheduler and block until Ctrl-C.
pub(crate) async fn run(config: Config, mode: RunMode) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting jobmesh v{}", env!("CARGO_PKG_VERSION"));

    let queues = if mode.workers() {
        config.feature.queues.clone()
    } else {
        Vec::new()
    };
    if mode == RunMode::WorkersOnly && queues.is_empty() {
        warn!("Workers-only mode without [feature].queues; nothing will be consumed");
    }

    let scheduler = SchedulerModule::from_config(&config)
        .for_feature(builtin_feature(&config.feature, queues))
        .build()
        .await?;

    if mode.triggers() {
        scheduler.start_triggers();
    }
    if mode.workers() {
        scheduler.start_workers();
    }

    info!(
        ?mode,
        jobs = scheduler.registry().len(),
        workers = scheduler.workers().len(),
        "jobmesh running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if !scheduler.shutdown().await {
        warn!("Some executions were still running at shutdown");
    }
    Ok(())
}
