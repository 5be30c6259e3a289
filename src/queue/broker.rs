//! Job Queue
//!
//! In-process broker with priority delivery, competing consumers, manual
//! acknowledgement and a dead-letter path keyed by delivery count. A message
//! is removed only after its handler returns `Ok`; a failed delivery goes
//! back to the ready heap until it has been delivered more than
//! `max_redeliveries` times, after which it is dead-lettered.
//!
//! With a journal, producer-side changes and deliveries are rolled back when
//! the journal write fails, so memory never runs ahead of disk.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{Job, JobResult, JobStatus};
use super::journal::{DeadLetter, Envelope, Journal, QueueSnapshot};
use super::tracker::{JobTracker, TrackedJob};
use super::JobHandler;
use crate::config::QueueConfig;
use crate::error::EngineResult;

pub const JOBS_QUEUE: &str = "jobs";
pub const DEAD_LETTER_QUEUE: &str = "jobs.dead_letter";
pub const RESULTS_QUEUE: &str = "jobs.results";

/// Backoff after a consumer-side error
const ERROR_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub depth: usize,
    pub in_flight: usize,
    pub consumers: usize,
}

#[derive(Clone, Default)]
struct QueueState {
    ready: BinaryHeap<Envelope>,
    in_flight: HashMap<Uuid, Envelope>,
    dead_letters: Vec<DeadLetter>,
    next_sequence: u64,
}

impl QueueState {
    fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut ready: BinaryHeap<Envelope> = snapshot.ready.into_iter().collect();
        // Unacknowledged deliveries from a previous run are redelivered.
        ready.extend(snapshot.in_flight);

        let next_sequence = ready
            .iter()
            .map(|e| e.sequence + 1)
            .max()
            .unwrap_or(0)
            .max(snapshot.next_sequence);

        Self {
            ready,
            in_flight: HashMap::new(),
            dead_letters: snapshot.dead_letters,
            next_sequence,
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            ready: self.ready.iter().cloned().collect(),
            in_flight: self.in_flight.values().cloned().collect(),
            dead_letters: self.dead_letters.clone(),
            next_sequence: self.next_sequence,
        }
    }

    fn enqueue(&mut self, job: Job) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ready.push(Envelope {
            job,
            sequence,
            delivery_count: 0,
            last_error: None,
        });
    }

    fn is_ready(&self, job_id: Uuid) -> bool {
        self.ready.iter().any(|e| e.job.job_id == job_id)
    }
}

struct StoredResult {
    result: JobResult,
    stored_at: Instant,
}

pub struct JobQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    results: Mutex<HashMap<Uuid, StoredResult>>,
    results_changed: Notify,
    tracker: Mutex<JobTracker>,
    journal: Option<Journal>,
    consumers: AtomicUsize,
}

impl JobQueue {
    /// Open a queue, restoring the journal when `config.journal_path` is set.
    pub async fn open(config: QueueConfig) -> EngineResult<Self> {
        let (state, journal) = match &config.journal_path {
            Some(path) => {
                let journal = Journal::new(path);
                let state = QueueState::from_snapshot(journal.load().await?);
                info!(
                    path = %path.display(),
                    ready = state.ready.len(),
                    dead_letters = state.dead_letters.len(),
                    "Restored job queue"
                );
                (state, Some(journal))
            }
            None => (QueueState::default(), None),
        };

        let mut tracker = JobTracker::default();
        for envelope in state.ready.iter() {
            tracker.track(&envelope.job);
        }

        Ok(Self {
            config,
            state: Mutex::new(state),
            results: Mutex::new(HashMap::new()),
            results_changed: Notify::new(),
            tracker: Mutex::new(tracker),
            journal,
            consumers: AtomicUsize::new(0),
        })
    }

    /// Volatile queue with the given settings; any journal path is ignored.
    pub fn in_memory(config: QueueConfig) -> Self {
        Self {
            config: QueueConfig {
                journal_path: None,
                ..config
            },
            state: Mutex::new(QueueState::default()),
            results: Mutex::new(HashMap::new()),
            results_changed: Notify::new(),
            tracker: Mutex::new(JobTracker::default()),
            journal: None,
            consumers: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn persist(&self, state: &QueueState) -> EngineResult<()> {
        match &self.journal {
            Some(journal) => journal.save(&state.snapshot()).await,
            None => Ok(()),
        }
    }

    /// Apply `change` and journal the result, restoring the previous state if
    /// the journal write fails.
    async fn commit<T>(
        &self,
        state: &mut QueueState,
        change: impl FnOnce(&mut QueueState) -> T,
    ) -> EngineResult<T> {
        let Some(journal) = &self.journal else {
            return Ok(change(state));
        };

        let before = state.clone();
        let out = change(state);
        if let Err(e) = journal.save(&state.snapshot()).await {
            warn!(error = %e, "Journal write failed, rolling back");
            *state = before;
            return Err(e);
        }
        Ok(out)
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    pub async fn submit(&self, job: Job) -> EngineResult<Uuid> {
        let job_id = job.job_id;
        info!(
            job_id = %job_id,
            namespace = %job.provider_namespace,
            resource_type = %job.resource_type,
            operation = %job.operation,
            priority = job.priority,
            "Submitted job"
        );

        let mut state = self.state.lock().await;
        self.commit(&mut state, |s| s.enqueue(job.clone())).await?;
        // Tracked under the state lock so no consumer can report on it first.
        self.tracker.lock().await.track(&job);
        Ok(job_id)
    }

    /// Remove a job that has not been delivered yet and publish a
    /// `cancelled` result. In-flight jobs are not interrupted.
    pub async fn cancel(&self, job_id: Uuid) -> EngineResult<bool> {
        {
            let mut state = self.state.lock().await;
            if !state.is_ready(job_id) {
                return Ok(false);
            }
            self.commit(&mut state, |s| {
                let remaining: Vec<Envelope> = std::mem::take(&mut s.ready)
                    .into_vec()
                    .into_iter()
                    .filter(|e| e.job.job_id != job_id)
                    .collect();
                s.ready = remaining.into();
            })
            .await?;
        }

        info!(job_id = %job_id, "Cancelled job");
        self.publish_result(JobResult::cancelled(job_id)).await;
        Ok(true)
    }

    // =========================================================================
    // Consumer side
    // =========================================================================

    /// Receive loop; returns once `shutdown` flips to `true`.
    pub async fn consume(&self, handler: Arc<dyn JobHandler>, mut shutdown: watch::Receiver<bool>) {
        self.consumers.fetch_add(1, Ordering::SeqCst);
        debug!("Consumer attached");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.consume_one(handler.as_ref()).await {
                Ok(true) => continue,
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval()) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error consuming job");
                    tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
                }
            }
        }

        self.consumers.fetch_sub(1, Ordering::SeqCst);
        debug!("Consumer detached");
    }

    /// Deliver at most one job to `handler`.
    /// Returns Ok(true) if a job was delivered, Ok(false) if the queue is empty.
    pub async fn consume_one(&self, handler: &dyn JobHandler) -> EngineResult<bool> {
        let delivered = {
            let mut state = self.state.lock().await;
            if state.ready.is_empty() {
                return Ok(false);
            }
            self.commit(&mut state, |s| {
                let mut envelope = s.ready.pop()?;
                envelope.delivery_count += 1;
                s.in_flight.insert(envelope.job.job_id, envelope.clone());
                Some(envelope)
            })
            .await?
        };
        let Some(delivered) = delivered else {
            return Ok(false);
        };

        let job_id = delivered.job.job_id;
        debug!(
            job_id = %job_id,
            delivery = delivered.delivery_count,
            "Delivering job"
        );

        let outcome = handler.handle(&delivered.job).await;

        // The handler has run, so its outcome stands even if the journal
        // write fails; a restart then redelivers the job.
        let (dead_lettered, persisted) = {
            let mut state = self.state.lock().await;
            let Some(mut envelope) = state.in_flight.remove(&job_id) else {
                return Ok(true);
            };

            let dead = match outcome {
                Ok(()) => {
                    debug!(job_id = %job_id, "Acknowledged job");
                    None
                }
                Err(e) if envelope.delivery_count > self.config.max_redeliveries => {
                    error!(
                        job_id = %job_id,
                        deliveries = envelope.delivery_count,
                        error = %e,
                        "Moving job to dead-letter queue"
                    );
                    let reason = format!(
                        "dead-lettered after {} deliveries: {}",
                        envelope.delivery_count, e
                    );
                    state.dead_letters.push(DeadLetter {
                        job: envelope.job,
                        delivery_count: envelope.delivery_count,
                        last_error: Some(e.to_string()),
                        dead_lettered_at: Utc::now(),
                    });
                    Some(reason)
                }
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        deliveries = envelope.delivery_count,
                        error = %e,
                        "Redelivering job"
                    );
                    envelope.last_error = Some(e.to_string());
                    state.ready.push(envelope);
                    None
                }
            };

            (dead, self.persist(&state).await)
        };

        if let Some(reason) = dead_lettered {
            self.publish_result(JobResult::failed(job_id, reason)).await;
        }
        persisted?;
        Ok(true)
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// Record a result and wake waiters. Results older than the configured
    /// TTL are dropped.
    pub async fn publish_result(&self, result: JobResult) {
        self.tracker
            .lock()
            .await
            .mark(result.job_id, result.status, result.error.clone());

        {
            let mut results = self.results.lock().await;
            let ttl = self.config.result_ttl();
            let before = results.len();
            results.retain(|_, stored| stored.stored_at.elapsed() < ttl);
            if results.len() < before {
                debug!(purged = before - results.len(), "Purged expired job results");
            }

            results.insert(
                result.job_id,
                StoredResult {
                    result,
                    stored_at: Instant::now(),
                },
            );
        }

        self.results_changed.notify_waiters();
    }

    async fn take_terminal_result(&self, job_id: Uuid) -> Option<JobResult> {
        let mut results = self.results.lock().await;
        let terminal = results
            .get(&job_id)
            .is_some_and(|stored| stored.result.is_terminal());
        if terminal {
            results.remove(&job_id).map(|stored| stored.result)
        } else {
            None
        }
    }

    /// Wait up to `timeout` for the final result of `job_id`, consuming it.
    /// Returns `None` when no terminal result arrived in time.
    pub async fn get_result(&self, job_id: Uuid, timeout: Duration) -> Option<JobResult> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.results_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.take_terminal_result(job_id).await {
                return Some(result);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.take_terminal_result(job_id).await;
            }
        }
    }

    /// Latest known status of a job.
    pub async fn job_status(&self, job_id: Uuid) -> Option<JobStatus> {
        if let Some(tracked) = self.tracker.lock().await.get(job_id) {
            return Some(tracked.status);
        }
        if let Some(stored) = self.results.lock().await.get(&job_id) {
            return Some(stored.result.status);
        }

        let state = self.state.lock().await;
        if state.in_flight.contains_key(&job_id) {
            Some(JobStatus::Processing)
        } else if state.is_ready(job_id) {
            Some(JobStatus::Pending)
        } else if state.dead_letters.iter().any(|d| d.job.job_id == job_id) {
            Some(JobStatus::Failed)
        } else {
            None
        }
    }

    pub async fn recent_jobs(&self, limit: usize) -> Vec<TrackedJob> {
        self.tracker.lock().await.recent(limit)
    }

    // =========================================================================
    // Dead letters and observability
    // =========================================================================

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Move a dead-lettered job back to the ready queue with a fresh
    /// delivery count.
    pub async fn requeue_dead_letter(&self, job_id: Uuid) -> EngineResult<bool> {
        let job = {
            let mut state = self.state.lock().await;
            let Some(pos) = state.dead_letters.iter().position(|d| d.job.job_id == job_id) else {
                return Ok(false);
            };
            self.commit(&mut state, |s| {
                let dead = s.dead_letters.remove(pos);
                s.enqueue(dead.job.clone());
                dead.job
            })
            .await?
        };

        self.results.lock().await.remove(&job_id);
        let mut tracker = self.tracker.lock().await;
        if tracker.get(job_id).is_some() {
            tracker.mark(job_id, JobStatus::Pending, None);
        } else {
            tracker.track(&job);
        }

        info!(job_id = %job_id, "Requeued dead-lettered job");
        Ok(true)
    }

    pub async fn purge_dead_letters(&self) -> EngineResult<usize> {
        let mut state = self.state.lock().await;
        let purged = self
            .commit(&mut state, |s| std::mem::take(&mut s.dead_letters).len())
            .await?;

        if purged > 0 {
            info!(purged, "Purged dead-letter queue");
        }
        Ok(purged)
    }

    /// Ready messages in the main queue.
    pub async fn depth(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }

    pub async fn get_queue_stats(&self) -> Vec<QueueStats> {
        let (depth, in_flight, dead) = {
            let state = self.state.lock().await;
            (
                state.ready.len(),
                state.in_flight.len(),
                state.dead_letters.len(),
            )
        };
        let results = self.results.lock().await.len();

        vec![
            QueueStats {
                name: JOBS_QUEUE.to_string(),
                depth,
                in_flight,
                consumers: self.consumer_count(),
            },
            QueueStats {
                name: DEAD_LETTER_QUEUE.to_string(),
                depth: dead,
                in_flight: 0,
                consumers: 0,
            },
            QueueStats {
                name: RESULTS_QUEUE.to_string(),
                depth: results,
                in_flight: 0,
                consumers: 0,
            },
        ]
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.config)
            .field("consumers", &self.consumer_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::resource::{Operation, ProviderRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn config(max_redeliveries: u32) -> QueueConfig {
        QueueConfig {
            max_redeliveries,
            poll_interval_ms: 5,
            ..Default::default()
        }
    }

    fn job(priority: u8) -> Job {
        Job::new("Ns", "t", Operation::Get, ProviderRequest::new()).with_priority(priority)
    }

    struct Recorder {
        seen: std::sync::Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        async fn handle(&self, job: &Job) -> EngineResult<()> {
            self.seen.lock().unwrap().push(job.job_id);
            Ok(())
        }
    }

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn handle(&self, _job: &Job) -> EngineResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Unavailable {
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_priority_delivery_order() {
        let queue = JobQueue::in_memory(config(3));
        let low = queue.submit(job(2)).await.unwrap();
        let high = queue.submit(job(9)).await.unwrap();
        let mid_a = queue.submit(job(5)).await.unwrap();
        let mid_b = queue.submit(job(5)).await.unwrap();

        let recorder = Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        };
        while queue.consume_one(&recorder).await.unwrap() {}

        assert_eq!(*recorder.seen.lock().unwrap(), vec![high, mid_a, mid_b, low]);
        assert_eq!(queue.depth().await, 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_redelivered_then_dead_lettered() {
        let queue = JobQueue::in_memory(config(2));
        let id = queue.submit(job(5)).await.unwrap();
        let handler = AlwaysFails {
            calls: AtomicU32::new(0),
        };

        while queue.consume_one(&handler).await.unwrap() {}

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.depth().await, 0);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.job_id, id);
        assert_eq!(dead[0].delivery_count, 3);

        let result = queue.get_result(id, Duration::from_millis(10)).await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_requeue_and_purge_dead_letters() {
        let queue = JobQueue::in_memory(config(0));
        let id = queue.submit(job(5)).await.unwrap();
        let failing = AlwaysFails {
            calls: AtomicU32::new(0),
        };
        queue.consume_one(&failing).await.unwrap();
        assert_eq!(queue.dead_letters().await.len(), 1);

        assert!(queue.requeue_dead_letter(id).await.unwrap());
        assert!(!queue.requeue_dead_letter(id).await.unwrap());
        assert_eq!(queue.depth().await, 1);
        assert_eq!(queue.job_status(id).await, Some(JobStatus::Pending));

        queue.consume_one(&failing).await.unwrap();
        assert_eq!(queue.purge_dead_letters().await.unwrap(), 1);
        assert!(queue.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_result_waits_for_terminal_status() {
        let queue = Arc::new(JobQueue::in_memory(config(3)));
        let id = Uuid::new_v4();

        let publisher = queue.clone();
        tokio::spawn(async move {
            publisher.publish_result(JobResult::processing(id)).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher
                .publish_result(JobResult::completed(id, json!({"ok": true})))
                .await;
        });

        let result = queue.get_result(id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.result, Some(json!({"ok": true})));

        // Consumed on read.
        assert!(queue.get_result(id, Duration::from_millis(5)).await.is_none());
    }

    #[tokio::test]
    async fn test_get_result_times_out() {
        let queue = JobQueue::in_memory(config(3));
        let started = Instant::now();
        assert!(queue
            .get_result(Uuid::new_v4(), Duration::from_millis(30))
            .await
            .is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let queue = JobQueue::in_memory(config(3));
        let keep = queue.submit(job(5)).await.unwrap();
        let cancelled = queue.submit(job(5)).await.unwrap();

        assert!(queue.cancel(cancelled).await.unwrap());
        assert!(!queue.cancel(cancelled).await.unwrap());
        assert_eq!(queue.depth().await, 1);
        assert_eq!(queue.job_status(cancelled).await, Some(JobStatus::Cancelled));
        assert_eq!(queue.job_status(keep).await, Some(JobStatus::Pending));

        let result = queue.get_result(cancelled, Duration::from_millis(10)).await.unwrap();
        assert_eq!(result.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_journal_restores_in_flight_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = QueueConfig {
            journal_path: Some(dir.path().join("queue.json")),
            ..config(3)
        };

        let first = JobQueue::open(cfg.clone()).await.unwrap();
        let a = first.submit(job(5)).await.unwrap();
        let b = first.submit(job(1)).await.unwrap();
        {
            // Simulate a crash mid-delivery: pop `a` without acknowledging it.
            let mut state = first.state.lock().await;
            let mut envelope = state.ready.pop().unwrap();
            envelope.delivery_count += 1;
            state.in_flight.insert(envelope.job.job_id, envelope);
            first.persist(&state).await.unwrap();
        }
        drop(first);

        let reopened = JobQueue::open(cfg).await.unwrap();
        assert_eq!(reopened.depth().await, 2);

        let recorder = Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        };
        while reopened.consume_one(&recorder).await.unwrap() {}
        assert_eq!(*recorder.seen.lock().unwrap(), vec![a, b]);

        let c = reopened.submit(job(5)).await.unwrap();
        assert_ne!(c, a);
    }

    /// Swap the journal directory for a regular file so writes fail.
    fn break_journal_dir(dir: &std::path::Path) {
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::write(dir, b"not a directory").unwrap();
    }

    fn restore_journal_dir(dir: &std::path::Path) {
        std::fs::remove_file(dir).unwrap();
        std::fs::create_dir(dir).unwrap();
    }

    fn journaled(dir: &std::path::Path) -> QueueConfig {
        QueueConfig {
            journal_path: Some(dir.join("q").join("queue.json")),
            ..config(0)
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_journal_write_keeps_job_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(journaled(tmp.path())).await.unwrap();
        let id = queue.submit(job(5)).await.unwrap();

        let journal_dir = tmp.path().join("q");
        break_journal_dir(&journal_dir);
        let recorder = Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        };
        assert!(queue.consume_one(&recorder).await.is_err());
        assert!(recorder.seen.lock().unwrap().is_empty());

        let stats = queue.get_queue_stats().await;
        assert_eq!(stats[0].depth, 1);
        assert_eq!(stats[0].in_flight, 0);
        assert_eq!(queue.job_status(id).await, Some(JobStatus::Pending));

        restore_journal_dir(&journal_dir);
        assert!(queue.consume_one(&recorder).await.unwrap());
        assert_eq!(*recorder.seen.lock().unwrap(), vec![id]);
        assert_eq!(queue.get_queue_stats().await[0].in_flight, 0);
    }

    #[tokio::test]
    async fn test_failed_submit_journal_write_leaves_no_trace() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(journaled(tmp.path())).await.unwrap();
        queue.submit(job(5)).await.unwrap();
        break_journal_dir(&tmp.path().join("q"));

        let rejected = job(5);
        let rejected_id = rejected.job_id;
        assert!(queue.submit(rejected).await.is_err());
        assert_eq!(queue.depth().await, 1);
        assert_eq!(queue.job_status(rejected_id).await, None);
    }

    /// Fails every delivery after breaking the journal directory.
    struct BreaksJournal {
        dir: std::path::PathBuf,
    }

    #[async_trait]
    impl JobHandler for BreaksJournal {
        async fn handle(&self, _job: &Job) -> EngineResult<()> {
            break_journal_dir(&self.dir);
            Err(EngineError::Queue("downstream busy".into()))
        }
    }

    #[tokio::test]
    async fn test_dead_letter_survives_failed_journal_write() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(journaled(tmp.path())).await.unwrap();
        let id = queue.submit(job(5)).await.unwrap();

        let handler = BreaksJournal {
            dir: tmp.path().join("q"),
        };
        assert!(queue.consume_one(&handler).await.is_err());

        let stats = queue.get_queue_stats().await;
        assert_eq!(stats[0].in_flight, 0);
        assert_eq!(queue.dead_letters().await.len(), 1);
        let result = queue.get_result(id, Duration::from_millis(10)).await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.error.unwrap().starts_with("dead-lettered after 1 deliveries"));
    }

    #[tokio::test]
    async fn test_stats_report_all_queues() {
        let queue = JobQueue::in_memory(config(0));
        queue.submit(job(5)).await.unwrap();
        queue.submit(job(5)).await.unwrap();
        let failing = AlwaysFails {
            calls: AtomicU32::new(0),
        };
        queue.consume_one(&failing).await.unwrap();

        let stats = queue.get_queue_stats().await;
        let by_name: HashMap<_, _> = stats.iter().map(|s| (s.name.as_str(), s)).collect();
        assert_eq!(by_name[JOBS_QUEUE].depth, 1);
        assert_eq!(by_name[DEAD_LETTER_QUEUE].depth, 1);
        assert_eq!(by_name[RESULTS_QUEUE].depth, 1);
        assert_eq!(by_name[JOBS_QUEUE].consumers, 0);
    }

    #[tokio::test]
    async fn test_consume_loop_stops_on_shutdown() {
        let queue = Arc::new(JobQueue::in_memory(config(3)));
        let (tx, rx) = watch::channel(false);
        let handler: Arc<dyn JobHandler> = Arc::new(Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        });

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume(handler, rx).await })
        };

        let id = queue.submit(job(5)).await.unwrap();
        for _ in 0..100 {
            if queue.depth().await == 0 && queue.consumer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.depth().await, 0);
        assert_eq!(queue.job_status(id).await, Some(JobStatus::Pending));

        tx.send(true).unwrap();
        consumer.await.unwrap();
        assert_eq!(queue.consumer_count(), 0);
    }
}
