//! In-memory store

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::ResourceStore;
use crate::error::EngineResult;

/// Map-backed store. Cheap to construct, nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> EngineResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Value) -> EngineResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn enumerate(&self) -> EngineResult<Vec<(String, Value)>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("a", json!(1)).await.unwrap());
        assert!(!store.put_if_absent("a", json!(2)).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = MemoryStore::new();
        store.put("a", json!({"x": 1})).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_enumerate_is_key_ordered() {
        let store = MemoryStore::new();
        store.put("b", json!(2)).await.unwrap();
        store.put("a", json!(1)).await.unwrap();
        let keys: Vec<String> = store
            .enumerate()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
