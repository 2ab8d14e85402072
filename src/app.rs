//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::Event,
    dispatcher::{Dispatcher, PublishReport},
    job::{DeliveryJob, HttpClients, Job, JobEngine, JobName, JobSubmitter},
    task_manager::TaskManager,
    topic::{default_registry, TopicRegistry},
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    engine: JobEngine,
    dispatcher: Dispatcher,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn engine(&self) -> &JobEngine {
        &self.engine
    }

    pub async fn publish(&self, topic: &str, event: &Event) -> PublishReport {
        self.dispatcher.publish(topic, event).await
    }

    /// Signals every worker to stop and waits for them to finish.
    pub async fn shutdown(self) {
        info!("Shutting down notifier...");
        self.task_manager.shutdown().await;
        info!("All tasks shut down.");
    }
}

/// Builder for the main application.
///
/// Tests use the overrides to swap in their own job implementations or topic
/// layout while keeping the real engine and dispatcher.
pub struct AppBuilder {
    config: Config,
    job_overrides: HashMap<JobName, Arc<dyn Job>>,
    registry_override: Option<Box<dyn FnOnce(Arc<dyn JobSubmitter>) -> TopicRegistry + Send>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            job_overrides: HashMap::new(),
            registry_override: None,
        }
    }

    /// Runs `job` instead of the HTTP delivery job for `name`.
    pub fn job_override(mut self, name: JobName, job: Arc<dyn Job>) -> Self {
        self.job_overrides.insert(name, job);
        self
    }

    /// Builds the topic registry with `build` instead of the default layout.
    /// The closure receives the engine as job submitter.
    pub fn registry_override<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Arc<dyn JobSubmitter>) -> TopicRegistry + Send + 'static,
    {
        self.registry_override = Some(Box::new(build));
        self
    }

    /// Builds every component and starts the engine workers.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all)]
    pub fn build(mut self) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new();

        let clients = Arc::new(
            HttpClients::new(&config.http).context("Failed to build HTTP clients")?,
        );

        let mut engine_builder = JobEngine::builder(config.engine.clone());
        for name in JobName::ALL {
            let job: Arc<dyn Job> = match self.job_overrides.remove(&name) {
                Some(job) => job,
                None => Arc::new(DeliveryJob::for_provider(
                    name,
                    clients.clone(),
                    &config.delivery,
                )),
            };
            engine_builder = engine_builder.register(name, job);
        }
        let engine = engine_builder.build();

        let submitter: Arc<dyn JobSubmitter> = Arc::new(engine.clone());
        let registry = match self.registry_override {
            Some(build) => build(submitter),
            None => default_registry(submitter),
        };
        info!(topics = ?registry, "Topic registry ready");

        engine.start(&task_manager);

        Ok(App {
            task_manager,
            engine,
            dispatcher: Dispatcher::new(registry),
        })
    }
}
