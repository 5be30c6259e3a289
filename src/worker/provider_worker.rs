//! Provider Worker
//!
//! Consumes jobs and runs them through the synchronous provider registry.
//! Retryable failures are retried in place with a fixed backoff; when the
//! attempts run out the error is re-raised so the queue redelivers (and
//! eventually dead-letters) the message. Non-retryable failures publish a
//! `failed` result and are acknowledged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::classify::{classify, FailureClass};
use crate::config::WorkerConfig;
use crate::error::EngineResult;
use crate::queue::{Job, JobHandler, JobQueue, JobResult};
use crate::resource::{Operation, ProviderRequest, ResourceProviderRegistry};

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

pub struct ProviderWorker {
    name: String,
    registry: Arc<ResourceProviderRegistry>,
    queue: Arc<JobQueue>,
    max_retries: u32,
    retry_backoff: Duration,
    counters: Counters,
}

impl ProviderWorker {
    pub fn new(
        name: impl Into<String>,
        registry: Arc<ResourceProviderRegistry>,
        queue: Arc<JobQueue>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            registry,
            queue,
            max_retries: config.max_retries.max(1),
            retry_backoff: config.retry_backoff(),
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Jobs completed successfully
    pub fn jobs_processed(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// Deliveries that ended in failure
    pub fn jobs_failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.counters.retries.load(Ordering::Relaxed)
    }

    /// Dispatch through the registry, retrying retryable failures up to
    /// `max_retries` attempts in total.
    pub async fn process_job(
        &self,
        job_id: Uuid,
        namespace: &str,
        resource_type: &str,
        operation: Operation,
        request: &ProviderRequest,
    ) -> EngineResult<Value> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(worker = %self.name, job_id = %job_id, attempt, "Processing job");

            let err = match self
                .registry
                .dispatch(namespace, resource_type, operation, request)
                .await
            {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if classify(&err) == FailureClass::NonRetryable {
                warn!(worker = %self.name, job_id = %job_id, error = %err, "Non-retryable failure");
                return Err(err);
            }

            if attempt >= self.max_retries {
                error!(
                    worker = %self.name,
                    job_id = %job_id,
                    attempts = attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(err);
            }

            warn!(
                worker = %self.name,
                job_id = %job_id,
                attempt,
                max_retries = self.max_retries,
                error = %err,
                "Retrying job"
            );
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.retry_backoff).await;
        }
    }
}

#[async_trait]
impl JobHandler for ProviderWorker {
    async fn handle(&self, job: &Job) -> EngineResult<()> {
        self.queue
            .publish_result(JobResult::processing(job.job_id))
            .await;

        let outcome = self
            .process_job(
                job.job_id,
                &job.provider_namespace,
                &job.resource_type,
                job.operation,
                &job.request,
            )
            .await;

        match outcome {
            Ok(value) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                info!(worker = %self.name, job_id = %job.job_id, "Job completed");
                self.queue
                    .publish_result(JobResult::completed(job.job_id, value))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                if classify(&e).is_retryable() {
                    // Left unacknowledged; the queue redelivers or dead-letters.
                    return Err(e);
                }
                self.queue
                    .publish_result(JobResult::failed(job.job_id, e.to_string()))
                    .await;
                Ok(())
            }
        }
    }
}
