//! Job wire format
//!
//! `Job` and `JobResult` are what producers, brokers and workers exchange.
//! Both serialize to flat JSON objects with snake_case keys.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::resource::{Operation, ProviderRequest};

/// Operations a job can carry.
pub type JobOperation = Operation;

pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_PRIORITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "◯",
            Self::Processing => "↻",
            Self::Completed => "✓",
            Self::Failed => "✗",
            Self::Cancelled => "⊘",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn clamped_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, MAX_PRIORITY as i64) as u8)
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub provider_namespace: String,
    pub resource_type: String,
    pub operation: JobOperation,
    #[serde(default)]
    pub request: ProviderRequest,
    pub submitted_at: DateTime<Utc>,
    /// 0-10, higher is more urgent
    #[serde(default = "default_priority", deserialize_with = "clamped_priority")]
    pub priority: u8,
}

impl Job {
    pub fn new(
        provider_namespace: impl Into<String>,
        resource_type: impl Into<String>,
        operation: JobOperation,
        request: ProviderRequest,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            provider_namespace: provider_namespace.into(),
            resource_type: resource_type.into(),
            operation,
            request,
            submitted_at: Utc::now(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    /// `Namespace/type`
    pub fn qualified_type(&self) -> String {
        format!("{}/{}", self.provider_namespace, self.resource_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobResult {
    fn with_status(job_id: Uuid, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn pending(job_id: Uuid) -> Self {
        Self::with_status(job_id, JobStatus::Pending)
    }

    pub fn processing(job_id: Uuid) -> Self {
        Self::with_status(job_id, JobStatus::Processing)
    }

    pub fn completed(job_id: Uuid, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::with_status(job_id, JobStatus::Completed)
        }
    }

    pub fn failed(job_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(job_id, JobStatus::Failed)
        }
    }

    pub fn cancelled(job_id: Uuid) -> Self {
        Self::with_status(job_id, JobStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
