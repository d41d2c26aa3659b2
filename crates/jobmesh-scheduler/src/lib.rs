//! # jobmesh Scheduler
//!
//! Local trigger engine and module composition.
//!
//! ## Components
//!
//! - [`CronTimer`] - per-job cron timer
//! - [`LocalTriggerEngine`] - fires run-on-start and cron jobs, runs them
//!   locally or dispatches them to their queue
//! - [`SchedulerModule`] - `for_root`/`for_feature` composition
//! - [`Scheduler`] - the assembled, running scheduler

pub mod cron_timer;
pub mod engine;
pub mod handle;
pub mod module;

pub use cron_timer::CronTimer;
pub use engine::{LocalTriggerEngine, NextFire, TriggerOutcome};
pub use handle::Scheduler;
pub use module::{FeatureOptions, SchedulerModule};
