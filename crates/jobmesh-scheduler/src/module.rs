//! Module composition.
//!
//! [`SchedulerModule::for_root`] carries the process-wide defaults,
//! [`SchedulerModule::for_feature`] adds the job providers, handler providers
//! and consumed queues of one feature. [`SchedulerModule::build`] validates
//! everything once and assembles the registry, trigger engine and worker
//! hosts into a [`Scheduler`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use jobmesh_config::{Config, FeatureConfig, JobOverride, QueueConfig, SchedulerConfig};
use jobmesh_core::{JobOptions, JobProvider, JobRegistry, JobRunner, OverlapGuard, SchedulerError};
use jobmesh_workqueue::{
    open_queue, DurableQueue, HandlerBinding, HandlerProvider, QueueDispatcher, QueueWorkerHost,
};

use crate::engine::LocalTriggerEngine;
use crate::handle::Scheduler;

/// Providers and queues contributed by one feature.
#[derive(Default, Clone)]
pub struct FeatureOptions {
    pub job_providers: Vec<Arc<dyn JobProvider>>,
    pub handler_providers: Vec<Arc<dyn HandlerProvider>>,
    /// Queues this process consumes.
    pub queues: Vec<String>,
}

impl FeatureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_provider(mut self, provider: Arc<dyn JobProvider>) -> Self {
        self.job_providers.push(provider);
        self
    }

    pub fn handler_provider(mut self, provider: Arc<dyn HandlerProvider>) -> Self {
        self.handler_providers.push(provider);
        self
    }

    pub fn consume(mut self, queue_name: impl Into<String>) -> Self {
        self.queues.push(queue_name.into());
        self
    }

    /// Drop providers the feature selection does not enable.
    pub fn select(mut self, feature: &FeatureConfig) -> Self {
        self.job_providers.retain(|p| feature.provider_enabled(p.name()));
        self.handler_providers
            .retain(|p| feature.provider_enabled(p.name()));
        self
    }
}

impl std::fmt::Debug for FeatureOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureOptions")
            .field(
                "job_providers",
                &self.job_providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "handler_providers",
                &self.handler_providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("queues", &self.queues)
            .finish()
    }
}

/// Builder for a [`Scheduler`].
pub struct SchedulerModule {
    config: SchedulerConfig,
    queue_config: QueueConfig,
    overrides: HashMap<String, JobOverride>,
    features: Vec<FeatureOptions>,
    queue: Option<Arc<dyn DurableQueue>>,
}

impl SchedulerModule {
    /// Start a module with process-wide scheduler options.
    pub fn for_root(config: SchedulerConfig) -> Self {
        Self {
            config,
            queue_config: QueueConfig::default(),
            overrides: HashMap::new(),
            features: Vec::new(),
            queue: None,
        }
    }

    /// Start a module from a loaded configuration file.
    pub fn from_config(config: &Config) -> Self {
        Self::for_root(config.scheduler.clone())
            .queue_config(config.queue.clone())
            .with_overrides(config.jobs.clone())
    }

    /// Add one feature. May be called several times.
    pub fn for_feature(mut self, feature: FeatureOptions) -> Self {
        self.features.push(feature);
        self
    }

    pub fn queue_config(mut self, queue_config: QueueConfig) -> Self {
        self.queue_config = queue_config;
        self
    }

    /// Use an already opened broker instead of the configured backend.
    pub fn with_queue(mut self, queue: Arc<dyn DurableQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, JobOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Validate and assemble the scheduler.
    ///
    /// Every configuration error is returned here; nothing is started.
    pub async fn build(self) -> Result<Scheduler, SchedulerError> {
        let mut registry = JobRegistry::new(self.config.clone()).with_overrides(self.overrides);
        for feature in &self.features {
            for provider in &feature.job_providers {
                registry.register_provider(provider.as_ref())?;
            }
        }

        let mut consumed: Vec<String> = Vec::new();
        for queue_name in self.features.iter().flat_map(|f| f.queues.iter()) {
            if queue_name.trim().is_empty() {
                return Err(SchedulerError::Configuration(
                    "consumed queue name must not be empty".to_string(),
                ));
            }
            if !consumed.contains(queue_name) {
                consumed.push(queue_name.clone());
            }
        }

        let mut bindings: BTreeMap<String, Vec<HandlerBinding>> = BTreeMap::new();
        for feature in &self.features {
            for provider in &feature.handler_providers {
                for binding in provider.handlers() {
                    bindings
                        .entry(binding.queue_name.clone())
                        .or_default()
                        .push(binding);
                }
            }
        }

        let needs_dispatcher = self.config.enable_queueing && registry.all().any(|d| d.is_queued());
        let queue = match self.queue {
            Some(queue) => Some(queue),
            None if needs_dispatcher || !consumed.is_empty() => {
                let queue = open_queue(&self.queue_config).await.map_err(|e| {
                    SchedulerError::Configuration(format!("failed to open queue backend: {}", e))
                })?;
                Some(queue)
            }
            None => None,
        };

        let guard = Arc::new(OverlapGuard::new());
        let runner = JobRunner::new(guard)
            .with_timeout(self.config.execution_timeout_ms.map(Duration::from_millis));

        let dispatcher = match (&queue, self.config.enable_queueing) {
            (Some(queue), true) => Some(QueueDispatcher::new(
                queue.clone(),
                self.config.default_queue_name.clone(),
            )),
            _ => None,
        };

        let defaults = JobOptions::from(self.config.default_job_options);
        let mut workers = Vec::with_capacity(consumed.len());
        if let Some(queue) = &queue {
            for queue_name in &consumed {
                let queue_bindings = bindings.remove(queue_name).unwrap_or_default();
                if queue_bindings.is_empty() {
                    return Err(SchedulerError::Configuration(format!(
                        "queue '{}' is consumed but has no handlers",
                        queue_name
                    )));
                }
                let host = QueueWorkerHost::new(
                    queue_name.clone(),
                    queue_bindings,
                    defaults,
                    queue.clone(),
                    runner.clone(),
                    &self.queue_config,
                )?;
                workers.push(Arc::new(host));
            }
        }

        for queue_name in bindings.keys() {
            debug!(queue = %queue_name, "Handlers registered for a queue this process does not consume");
        }

        let registry = Arc::new(registry);
        let engine = Arc::new(LocalTriggerEngine::new(registry, runner, dispatcher.clone()));

        info!(
            jobs = engine.registry().len(),
            workers = workers.len(),
            queueing = dispatcher.is_some(),
            "Scheduler module built"
        );

        Ok(Scheduler::new(
            engine,
            workers,
            dispatcher,
            queue,
            Duration::from_secs(self.config.shutdown_timeout_secs),
        ))
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
