//! Worker Registry
//!
//! Owns a set of [`ProviderWorker`]s, runs each as a competing consumer on
//! its own tokio task, and reports their combined status.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::provider_worker::ProviderWorker;
use crate::config::WorkerConfig;
use crate::queue::{JobHandler, JobQueue};
use crate::resource::ResourceProviderRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub state: WorkerState,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub retries: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub total_workers: usize,
    pub running: usize,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub workers: Vec<WorkerStatus>,
}

pub struct WorkerRegistry {
    workers: Vec<Arc<ProviderWorker>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
    state: WorkerState,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            handles: Vec::new(),
            shutdown: None,
            state: WorkerState::Idle,
        }
    }

    /// `config.count` workers named `worker-0..`, all dispatching through
    /// `registry` and publishing to `queue`.
    pub fn with_pool(
        registry: Arc<ResourceProviderRegistry>,
        queue: Arc<JobQueue>,
        config: &WorkerConfig,
    ) -> Self {
        let mut workers = Self::new();
        for i in 0..config.count {
            workers.register(Arc::new(ProviderWorker::new(
                format!("worker-{}", i),
                registry.clone(),
                queue.clone(),
                config,
            )));
        }
        workers
    }

    pub fn register(&mut self, worker: Arc<ProviderWorker>) {
        info!(worker = %worker.name(), "Registered worker");
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    /// Spawn one consumer task per worker on `queue`. Returns the number of
    /// workers started; a registry that is already running starts none.
    pub fn start_all(&mut self, queue: Arc<JobQueue>) -> usize {
        if self.is_running() {
            warn!("Workers already running");
            return 0;
        }

        let (tx, rx) = watch::channel(false);
        for worker in &self.workers {
            let queue = queue.clone();
            let handler: Arc<dyn JobHandler> = worker.clone();
            let shutdown = rx.clone();
            self.handles.push(tokio::spawn(async move {
                queue.consume(handler, shutdown).await;
            }));
        }

        self.shutdown = Some(tx);
        self.state = WorkerState::Running;
        info!(count = self.workers.len(), "Started workers");
        self.workers.len()
    }

    /// Signal shutdown and wait for every consumer task to finish its current
    /// job and exit.
    pub async fn stop_all(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        let _ = shutdown.send(true);

        for result in futures::future::join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        self.state = WorkerState::Stopped;
        info!("Stopped workers");
    }

    pub fn status(&self) -> RegistryStatus {
        let workers: Vec<WorkerStatus> = self
            .workers
            .iter()
            .map(|w| WorkerStatus {
                name: w.name().to_string(),
                state: self.state,
                jobs_processed: w.jobs_processed(),
                jobs_failed: w.jobs_failed(),
                retries: w.retries(),
            })
            .collect();

        RegistryStatus {
            total_workers: workers.len(),
            running: workers
                .iter()
                .filter(|w| w.state == WorkerState::Running)
                .count(),
            jobs_processed: workers.iter().map(|w| w.jobs_processed).sum(),
            jobs_failed: workers.iter().map(|w| w.jobs_failed).sum(),
            workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{Job, JobStatus};
    use crate::resource::{register_builtin_providers, Operation, ProviderRequest};
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_processes_jobs_and_reports_status() {
        let mut providers = ResourceProviderRegistry::new();
        register_builtin_providers(
            &mut providers,
            Arc::new(MemoryStore::new()),
            &Default::default(),
        )
        .unwrap();

        let queue = Arc::new(JobQueue::in_memory(QueueConfig {
            poll_interval_ms: 5,
            ..Default::default()
        }));
        let config = WorkerConfig {
            count: 2,
            max_retries: 1,
            retry_backoff_ms: 0,
        };
        let mut workers = WorkerRegistry::with_pool(Arc::new(providers), queue.clone(), &config);
        assert_eq!(workers.status().workers[0].state, WorkerState::Idle);

        assert_eq!(workers.start_all(queue.clone()), 2);
        assert_eq!(workers.start_all(queue.clone()), 0);

        let mut ids = Vec::new();
        for name in ["a-rg", "b-rg", "c-rg"] {
            let job = Job::new(
                "Microsoft.Resources",
                "resourceGroups",
                Operation::Create,
                ProviderRequest::new()
                    .subscription("sub-1")
                    .name(name)
                    .location("westus"),
            );
            ids.push(queue.submit(job).await.unwrap());
        }

        for id in ids {
            let result = queue.get_result(id, Duration::from_secs(5)).await.unwrap();
            assert_eq!(result.status, JobStatus::Completed);
        }

        let status = workers.status();
        assert_eq!(status.running, 2);
        assert_eq!(status.jobs_processed, 3);
        assert_eq!(status.jobs_failed, 0);
        assert_eq!(queue.consumer_count(), 2);

        workers.stop_all().await;
        assert!(!workers.is_running());
        assert_eq!(workers.status().running, 0);
        assert_eq!(queue.consumer_count(), 0);
    }
}
