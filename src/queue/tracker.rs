//! Job Tracker
//!
//! Keeps a bounded history of recent jobs with their status, attempt count
//! and duration, for `job_status` lookups and operator summaries.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::job::{Job, JobOperation, JobStatus};

/// One tracked job
#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub job_id: Uuid,
    pub operation: JobOperation,
    pub resource_type: String,
    pub resource_name: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Deliveries that reached a handler
    pub attempts: u32,
    pub submitted_at: Instant,
    pub completed_at: Option<Instant>,
}

impl TrackedJob {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            operation: job.operation,
            resource_type: job.qualified_type(),
            resource_name: job.request.resource_name.clone(),
            status: JobStatus::Pending,
            error: None,
            attempts: 0,
            submitted_at: Instant::now(),
            completed_at: None,
        }
    }

    /// Get duration of the job (or elapsed time if still running)
    pub fn duration(&self) -> Duration {
        self.completed_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.submitted_at)
    }

    /// Format duration for display
    pub fn duration_display(&self) -> String {
        let d = self.duration();
        if d.as_secs() < 1 {
            format!("{}ms", d.as_millis())
        } else if d.as_secs() < 60 {
            format!("{}s", d.as_secs())
        } else {
            format!("{}m{}s", d.as_secs() / 60, d.as_secs() % 60)
        }
    }

    /// One-line summary, e.g. `✓ completed get Microsoft.Resources/resourceGroups/prod-rg (12ms)`
    pub fn summary(&self) -> String {
        let target = match &self.resource_name {
            Some(name) => format!("{}/{}", self.resource_type, name),
            None => self.resource_type.clone(),
        };
        let base = format!(
            "{} {} {} {}",
            self.status.icon(),
            self.status,
            self.operation,
            target
        );

        match (&self.error, self.status.is_terminal()) {
            (Some(err), _) => format!("{} - {}", base, err),
            (None, true) => format!("{} ({})", base, self.duration_display()),
            (None, false) => format!("{}...", base),
        }
    }
}

pub struct JobTracker {
    /// All tracked jobs (recent first)
    jobs: VecDeque<TrackedJob>,
    max_history: usize,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(500)
    }
}

impl JobTracker {
    pub fn new(max_history: usize) -> Self {
        Self {
            jobs: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn track(&mut self, job: &Job) {
        self.jobs.retain(|j| j.job_id != job.job_id);
        self.jobs.push_front(TrackedJob::new(job));
        self.trim_history();
    }

    /// Record a status change. Unknown ids are ignored.
    pub fn mark(&mut self, job_id: Uuid, status: JobStatus, error: Option<String>) {
        let Some(job) = self.jobs.iter_mut().find(|j| j.job_id == job_id) else {
            return;
        };

        match status {
            JobStatus::Pending => {
                job.completed_at = None;
                job.error = None;
            }
            JobStatus::Processing => job.attempts += 1,
            _ => job.completed_at = Some(Instant::now()),
        }
        job.status = status;
        if error.is_some() {
            job.error = error;
        }
    }

    pub fn get(&self, job_id: Uuid) -> Option<&TrackedJob> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    /// Get count of pending or processing jobs
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .count()
    }

    /// Most recent jobs first
    pub fn recent(&self, limit: usize) -> Vec<TrackedJob> {
        self.jobs.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Trim history to max size
    fn trim_history(&mut self) {
        while self.jobs.len() > self.max_history {
            // Remove oldest finished job
            if let Some(pos) = self.jobs.iter().rposition(|j| j.status.is_terminal()) {
                self.jobs.remove(pos);
            } else {
                self.jobs.pop_back();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Operation, ProviderRequest};

    fn job(name: &str) -> Job {
        Job::new(
            "Microsoft.Resources",
            "resourceGroups",
            Operation::Create,
            ProviderRequest::new().name(name),
        )
    }

    #[test]
    fn test_job_lifecycle() {
        let mut tracker = JobTracker::default();
        let j = job("prod-rg");
        tracker.track(&j);
        assert_eq!(tracker.get(j.job_id).unwrap().status, JobStatus::Pending);
        assert_eq!(tracker.active_count(), 1);

        tracker.mark(j.job_id, JobStatus::Processing, None);
        tracker.mark(j.job_id, JobStatus::Processing, None);
        assert_eq!(tracker.get(j.job_id).unwrap().attempts, 2);

        tracker.mark(j.job_id, JobStatus::Completed, None);
        let tracked = tracker.get(j.job_id).unwrap();
        assert!(tracked.completed_at.is_some());
        assert!(tracked
            .summary()
            .starts_with("✓ completed create Microsoft.Resources/resourceGroups/prod-rg ("));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_failed_summary_carries_error() {
        let mut tracker = JobTracker::default();
        let j = job("x");
        tracker.track(&j);
        tracker.mark(j.job_id, JobStatus::Failed, Some("connection reset".into()));
        assert!(tracker
            .get(j.job_id)
            .unwrap()
            .summary()
            .ends_with("- connection reset"));
    }

    #[test]
    fn test_trim_prefers_finished_jobs() {
        let mut tracker = JobTracker::new(2);
        let done = job("done");
        let active = job("active");
        tracker.track(&done);
        tracker.mark(done.job_id, JobStatus::Completed, None);
        tracker.track(&active);
        tracker.track(&job("newest"));

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(done.job_id).is_none());
        assert!(tracker.get(active.job_id).is_some());
    }
}
