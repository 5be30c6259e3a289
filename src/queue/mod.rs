//! Asynchronous job queue
//!
//! Offloaded operations travel as [`Job`]s through a [`JobQueue`] and come
//! back as [`JobResult`]s correlated by job id.
//!
//! - [`job`] - wire types
//! - [`broker`] - the queue: priority delivery, ack/redelivery, dead letters
//! - [`journal`] - optional on-disk durability
//! - [`tracker`] - bounded status history of recent jobs

pub mod broker;
pub mod job;
pub mod journal;
pub mod tracker;

use async_trait::async_trait;

use crate::error::EngineResult;

pub use broker::{JobQueue, QueueStats, DEAD_LETTER_QUEUE, JOBS_QUEUE, RESULTS_QUEUE};
pub use job::{Job, JobOperation, JobResult, JobStatus, DEFAULT_PRIORITY, MAX_PRIORITY};
pub use journal::DeadLetter;
pub use tracker::{JobTracker, TrackedJob};

/// Consumer callback. Returning `Err` leaves the message unacknowledged so
/// the queue redelivers it.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> EngineResult<()>;
}
