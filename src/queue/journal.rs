//! Queue journal
//!
//! Durable snapshot of a [`super::JobQueue`]: ready, in-flight and
//! dead-lettered messages. Rewritten after every queue mutation with the same
//! temp-file-then-rename scheme as the JSON resource store.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Job;
use crate::error::{EngineError, EngineResult};

/// A job as held by the broker, with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub job: Job,
    /// Submission order; ties between equal priorities go to the lower value.
    pub sequence: u64,
    #[serde(default)]
    pub delivery_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Eq for Envelope {}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A message that exceeded its redelivery limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: Job,
    pub delivery_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub ready: Vec<Envelope>,
    #[serde(default)]
    pub in_flight: Vec<Envelope>,
    #[serde(default)]
    pub dead_letters: Vec<DeadLetter>,
    #[serde(default)]
    pub next_sequence: u64,
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot; a missing or empty journal is an empty queue.
    pub async fn load(&self) -> EngineResult<QueueSnapshot> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(QueueSnapshot::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(QueueSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, snapshot: &QueueSnapshot) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            EngineError::Queue(format!(
                "Failed to replace journal {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
