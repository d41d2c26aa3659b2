//! jobmesh - declarative job scheduler with distributed queue dispatch.
//!
//! Main entry point for the jobmesh CLI.

mod cli;
mod cmd_admin;
mod cmd_run;
mod jobs;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use jobmesh_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};

use cli::{Cli, Commands, RunMode};

/// Get the jobmesh home directory (~/.jobmesh).
fn jobmesh_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".jobmesh"))
        .unwrap_or_else(|| PathBuf::from(".jobmesh"))
}

/// Initialize tracing with console and optional file output.
///
/// Log files are written to `~/.jobmesh/logs/` (or the configured
/// directory) with daily rotation.
fn init_tracing(logging: &LoggingConfig, log_dir: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let file_layer = if logging.file_enabled {
        let log_dir = log_dir
            .map(Path::to_path_buf)
            .or_else(|| logging.dir.clone())
            .unwrap_or_else(|| jobmesh_dir().join("logs"));
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("jobmesh")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the writer alive for the program duration.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

/// Reject an invalid configuration and log its warnings.
fn check_config(config: Config) -> Result<Config, Box<dyn std::error::Error>> {
    let warnings = ConfigValidator::validate(&config)?.into_result()?;
    for warning in warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // `validate` reports problems itself; it must not fail on them first.
    if let Some(Commands::Validate) = cli.command {
        init_tracing(&LoggingConfig { file_enabled: false, ..Default::default() }, None)?;
        return cmd_admin::validate(&cli.config);
    }

    let config = ConfigLoader::load_or_default(&cli.config)?;
    let console_only = !matches!(cli.command, None | Some(Commands::Run { .. }));
    let logging = LoggingConfig {
        file_enabled: config.logging.file_enabled && !console_only,
        ..config.logging.clone()
    };
    init_tracing(&logging, cli.log_dir.as_deref())?;

    let config = check_config(config)?;
    info!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        None => cmd_run::run(config, RunMode::Both).await,
        Some(Commands::Run { triggers_only, workers_only }) => {
            cmd_run::run(config, RunMode::from_flags(triggers_only, workers_only)).await
        }
        Some(Commands::Jobs { format }) => cmd_admin::list_jobs(&config, &format),
        Some(Commands::Enqueue { job, queue, payload }) => {
            cmd_admin::enqueue(&config, &job, queue.as_deref(), payload.as_deref()).await
        }
        Some(Commands::Validate) => cmd_admin::validate(&cli.config),
    }
}
