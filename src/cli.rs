//! CLI definitions for jobmesh.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobmesh CLI.
#[derive(Parser)]
#[command(name = "jobmesh")]
#[command(about = "Declarative job scheduler with distributed queue dispatch")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true, env = "JOBMESH_CONFIG")]
    pub config: PathBuf,

    /// Log directory (overrides the configured one)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run triggers and workers until Ctrl-C (default)
    Run {
        /// Only fire triggers; consume no queues
        #[arg(long, conflicts_with = "workers_only")]
        triggers_only: bool,

        /// Only consume queues; fire no triggers
        #[arg(long)]
        workers_only: bool,
    },

    /// List registered jobs with their next fire time
    Jobs {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Push a message for a job onto its queue
    Enqueue {
        /// Job name carried by the message
        job: String,

        /// Target queue (defaults to the job's queue or the default queue)
        #[arg(long)]
        queue: Option<String>,

        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
    },

    /// Load and validate the configuration
    Validate,
}

/// Which halves of the scheduler `run` starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    Both,
    TriggersOnly,
    WorkersOnly,
}

impl RunMode {
    pub fn from_flags(triggers_only: bool, workers_only: bool) -> Self {
        match (triggers_only, workers_only) {
            (true, _) => RunMode::TriggersOnly,
            (_, true) => RunMode::WorkersOnly,
            _ => RunMode::Both,
        }
    }

    pub fn triggers(&self) -> bool {
        *self != RunMode::WorkersOnly
    }

    pub fn workers(&self) -> bool {
        *self != RunMode::TriggersOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from(["jobmesh", "run", "--triggers-only"]);
        match cli.command {
            Some(Commands::Run { triggers_only, workers_only }) => {
                assert_eq!(RunMode::from_flags(triggers_only, workers_only), RunMode::TriggersOnly);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_flags_conflict() {
        assert!(Cli::try_parse_from(["jobmesh", "run", "--triggers-only", "--workers-only"]).is_err());
    }

    #[test]
    fn test_parse_enqueue() {
        let cli = Cli::parse_from([
            "jobmesh",
            "-c",
            "custom.toml",
            "enqueue",
            "recalculate",
            "--queue",
            "timesheets",
            "--payload",
            "{\"period\":\"2024-03\"}",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Some(Commands::Enqueue { job, queue, payload }) => {
                assert_eq!(job, "recalculate");
                assert_eq!(queue.as_deref(), Some("timesheets"));
                assert!(payload.unwrap().contains("2024-03"));
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn test_run_mode_halves() {
        assert!(RunMode::Both.triggers() && RunMode::Both.workers());
        assert!(!RunMode::TriggersOnly.workers());
        assert!(!RunMode::WorkersOnly.triggers());
    }
}
