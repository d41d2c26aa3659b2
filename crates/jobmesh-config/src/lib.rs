//! # jobmesh Config
//!
//! Configuration management for the jobmesh scheduler: the process-wide
//! scheduler defaults, the per-process feature selection, queue backend
//! settings and per-job overrides.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
