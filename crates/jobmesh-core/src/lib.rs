//! # jobmesh Core
//!
//! Scheduling primitives shared by the trigger engine and the queue workers.
//!
//! ## Components
//!
//! - [`JobRegistry`] - validated, immutable job descriptors keyed by name
//! - [`OverlapGuard`] - at-most-one-concurrent execution per job name
//! - [`RetryPolicy`] - bounded fixed-delay retries
//! - [`JobRunner`] - runs a body under the guard and retry policy
//! - [`CronSchedule`] - 5/6-field cron expressions in an IANA timezone

pub mod descriptor;
pub mod error;
pub mod execution;
pub mod job;
pub mod overlap;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod schedule;

pub use descriptor::{JobDefinition, JobDescriptor, JobOptions, JobOptionsOverride, QueueTarget};
pub use error::{JobError, SchedulerError, SchedulerResult};
pub use execution::{ExecutionOutcome, ExecutionReport, JobExecution, RunOutcome};
pub use job::{job_fn, FnJob, Job, JobBinding, JobContext, JobProvider, Trigger};
pub use overlap::{OverlapGuard, OverlapPermit};
pub use registry::{JobRegistry, RegisteredJob};
pub use retry::RetryPolicy;
pub use runner::JobRunner;
pub use schedule::CronSchedule;
