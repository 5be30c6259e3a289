//! Engine State
//!
//! Central wiring for tarm: one shared resource store, the synchronous
//! provider registry, the job queue, the offloading front end and the
//! worker pool, all built from an [`EngineConfig`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::offload::OffloadingProviderRegistry;
use crate::queue::JobQueue;
use crate::resource::{register_builtin_providers, ResourceProviderRegistry};
use crate::store::{JsonFileStore, MemoryStore, ResourceStore};
use crate::worker::{RegistryStatus, WorkerRegistry};

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn ResourceStore>,
    registry: Arc<ResourceProviderRegistry>,
    queue: Arc<JobQueue>,
    offload: OffloadingProviderRegistry,
    workers: WorkerRegistry,
}

impl Engine {
    /// Build an engine with the built-in providers registered. Workers are
    /// not started.
    pub async fn build(config: EngineConfig) -> EngineResult<Self> {
        let store: Arc<dyn ResourceStore> = match &config.store.path {
            Some(path) => Arc::new(JsonFileStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let mut registry = ResourceProviderRegistry::new();
        register_builtin_providers(&mut registry, store.clone(), &config.provisioning)?;

        Self::with_registry(config, store, registry).await
    }

    /// Build an engine around a caller-assembled registry.
    pub async fn with_registry(
        config: EngineConfig,
        store: Arc<dyn ResourceStore>,
        registry: ResourceProviderRegistry,
    ) -> EngineResult<Self> {
        let registry = Arc::new(registry);
        let queue = Arc::new(JobQueue::open(config.queue.clone()).await?);
        let offload = OffloadingProviderRegistry::new(queue.clone());
        let workers = WorkerRegistry::with_pool(registry.clone(), queue.clone(), &config.worker);

        tracing::info!(
            providers = registry.len(),
            workers = workers.len(),
            durable_store = config.store.path.is_some(),
            durable_queue = config.queue.journal_path.is_some(),
            "Engine ready"
        );

        Ok(Self {
            config,
            store,
            registry,
            queue,
            offload,
            workers,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Synchronous dispatch path
    pub fn registry(&self) -> &Arc<ResourceProviderRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Offloaded dispatch path
    pub fn offload(&self) -> &OffloadingProviderRegistry {
        &self.offload
    }

    pub fn start_workers(&mut self) -> usize {
        self.workers.start_all(self.queue.clone())
    }

    pub async fn shutdown(&mut self) {
        self.workers.stop_all().await;
    }

    pub fn worker_status(&self) -> RegistryStatus {
        self.workers.status()
    }
}
