//! Job descriptor registry.
//!
//! Populated once during startup and read-only afterwards. Registering a job
//! never executes it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use jobmesh_config::{JobOverride, SchedulerConfig};

use crate::descriptor::{JobDefinition, JobDescriptor};
use crate::error::SchedulerError;
use crate::job::{Job, JobProvider};

/// A registered descriptor and its body.
#[derive(Clone)]
pub struct RegisteredJob {
    pub descriptor: JobDescriptor,
    pub job: Arc<dyn Job>,
}

/// Registry of job descriptors keyed by unique name.
pub struct JobRegistry {
    config: SchedulerConfig,
    overrides: HashMap<String, JobOverride>,
    jobs: BTreeMap<String, RegisteredJob>,
}

impl JobRegistry {
    /// Create an empty registry resolving definitions against `config`.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            overrides: HashMap::new(),
            jobs: BTreeMap::new(),
        }
    }

    /// Per-job overrides applied to definitions before validation.
    pub fn with_overrides(mut self, overrides: HashMap<String, JobOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate and store a job.
    ///
    /// On error the registry is left unchanged.
    pub fn register(
        &mut self,
        definition: JobDefinition,
        job: Arc<dyn Job>,
    ) -> Result<&JobDescriptor, SchedulerError> {
        if self.jobs.contains_key(&definition.name) {
            return Err(SchedulerError::DuplicateJobName(definition.name));
        }

        let definition = match self.overrides.get(&definition.name) {
            Some(over) => {
                debug!(job_name = %definition.name, "Applying configuration override");
                definition.with_override(over)
            }
            None => definition,
        };

        let descriptor = definition.resolve(&self.config)?;
        let name = descriptor.name().to_string();

        info!(
            job_name = %name,
            cron = descriptor.cron_expression().unwrap_or("-"),
            timezone = descriptor.timezone(),
            queue = descriptor.queue_name().unwrap_or("-"),
            enabled = descriptor.is_enabled(),
            "Registered job"
        );

        let entry = self
            .jobs
            .entry(name)
            .or_insert(RegisteredJob { descriptor, job });
        Ok(&entry.descriptor)
    }

    /// Register every job a provider contributes.
    pub fn register_provider(&mut self, provider: &dyn JobProvider) -> Result<usize, SchedulerError> {
        let bindings = provider.jobs();
        let count = bindings.len();
        for binding in bindings {
            self.register(binding.definition, binding.job)?;
        }
        debug!(provider = provider.name(), count, "Registered provider jobs");
        Ok(count)
    }

    /// Descriptor registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&JobDescriptor, SchedulerError> {
        self.jobs
            .get(name)
            .map(|entry| &entry.descriptor)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))
    }

    /// Descriptor and body registered under `name`.
    pub fn get(&self, name: &str) -> Option<&RegisteredJob> {
        self.jobs.get(name)
    }

    /// All descriptors, ordered by name.
    pub fn all(&self) -> impl Iterator<Item = &JobDescriptor> + '_ {
        self.jobs.values().map(|entry| &entry.descriptor)
    }

    /// All registered jobs, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = &RegisteredJob> + '_ {
        self.jobs.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
