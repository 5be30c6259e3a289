//! Durable JSON file store
//!
//! Keeps the full map in memory and rewrites the backing document after each
//! mutation (temp file + rename, so a crash never leaves a torn file). A
//! mutation whose flush fails is undone in memory before the error returns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::ResourceStore;
use crate::error::{EngineError, EngineResult};

pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing entries if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), entries = entries.len(), "Opened resource store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            EngineError::Store(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl ResourceStore for JsonFileStore {
    async fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> EngineResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.flush(&entries).await {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Value) -> EngineResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        if let Err(e) = self.flush(&entries).await {
            entries.remove(key);
            return Err(e);
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        let mut entries = self.entries.lock().await;
        let Some(removed) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&entries).await {
            entries.insert(key.to_string(), removed);
            return Err(e);
        }
        Ok(true)
    }

    async fn enumerate(&self) -> EngineResult<Vec<(String, Value)>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
