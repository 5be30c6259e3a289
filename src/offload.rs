//! Offloading Provider Registry
//!
//! Same operations as [`ResourceProviderRegistry`](crate::resource::ResourceProviderRegistry),
//! but nothing runs on the caller's task: each call becomes a [`Job`] on the
//! [`JobQueue`] and the caller gets a `pending` [`JobResult`] carrying the job
//! id. [`OffloadingProviderRegistry::dispatch_and_wait`] adds request/response
//! semantics over the same queue.

use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineResult;
use crate::queue::{Job, JobQueue, JobResult};
use crate::resource::{Operation, ProviderRequest};

/// Reads are cheap and jump ahead of long-running writes.
pub fn priority_for(operation: Operation) -> u8 {
    match operation {
        Operation::Get => 8,
        Operation::List => 7,
        Operation::Action => 5,
        Operation::Create | Operation::Delete => 4,
    }
}

#[derive(Debug, Clone)]
pub struct OffloadingProviderRegistry {
    queue: Arc<JobQueue>,
}

impl OffloadingProviderRegistry {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Enqueue `operation` and return immediately with a pending result.
    pub async fn submit(
        &self,
        namespace: &str,
        resource_type: &str,
        operation: Operation,
        request: ProviderRequest,
    ) -> EngineResult<JobResult> {
        let job = Job::new(namespace, resource_type, operation, request)
            .with_priority(priority_for(operation));
        let job_id = self.queue.submit(job).await?;
        Ok(JobResult::pending(job_id))
    }

    pub async fn create_or_update(
        &self,
        namespace: &str,
        resource_type: &str,
        request: ProviderRequest,
    ) -> EngineResult<JobResult> {
        self.submit(namespace, resource_type, Operation::Create, request)
            .await
    }

    pub async fn get(
        &self,
        namespace: &str,
        resource_type: &str,
        request: ProviderRequest,
    ) -> EngineResult<JobResult> {
        self.submit(namespace, resource_type, Operation::Get, request)
            .await
    }

    pub async fn list(
        &self,
        namespace: &str,
        resource_type: &str,
        request: ProviderRequest,
    ) -> EngineResult<JobResult> {
        self.submit(namespace, resource_type, Operation::List, request)
            .await
    }

    pub async fn delete(
        &self,
        namespace: &str,
        resource_type: &str,
        request: ProviderRequest,
    ) -> EngineResult<JobResult> {
        self.submit(namespace, resource_type, Operation::Delete, request)
            .await
    }

    pub async fn execute_action(
        &self,
        namespace: &str,
        resource_type: &str,
        request: ProviderRequest,
    ) -> EngineResult<JobResult> {
        self.submit(namespace, resource_type, Operation::Action, request)
            .await
    }

    /// Enqueue, then wait up to `timeout` for the final result. On timeout the
    /// pending result is returned and the job keeps running.
    pub async fn dispatch_and_wait(
        &self,
        namespace: &str,
        resource_type: &str,
        operation: Operation,
        request: ProviderRequest,
        timeout: Duration,
    ) -> EngineResult<JobResult> {
        let pending = self
            .submit(namespace, resource_type, operation, request)
            .await?;

        match self.queue.get_result(pending.job_id, timeout).await {
            Some(result) => Ok(result),
            None => {
                tracing::debug!(job_id = %pending.job_id, "Timed out waiting for job result");
                Ok(pending)
            }
        }
    }
}
