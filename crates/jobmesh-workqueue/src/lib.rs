//! # jobmesh Workqueue
//!
//! Durable queue dispatch for scheduled jobs.
//!
//! ## Features
//!
//! - Broker-agnostic [`DurableQueue`] trait with at-least-once delivery
//! - In-memory and directory-backed brokers with dedup-by-key
//! - [`QueueDispatcher`] producing deterministic dedup keys per tick
//! - [`QueueWorkerHost`] routing messages to handlers by job name

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod memory;
pub mod message;
pub mod queue;
pub mod store;
pub mod worker;

pub use dispatcher::QueueDispatcher;
pub use error::QueueError;
pub use handler::{handler_fn, DeliveryContext, HandlerBinding, HandlerProvider, QueueHandler};
pub use memory::MemoryQueue;
pub use message::{dedup_key, QueueMessage};
pub use queue::{consume, open_queue, Delivery, DurableQueue, EnqueueReceipt};
pub use store::FileQueue;
pub use worker::{build_handler_map, BoundHandler, QueueWorkerHost, WorkerStatsSnapshot};
