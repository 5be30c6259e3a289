//! Key-namespacing adapter over a shared store

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::ResourceStore;
use crate::error::EngineResult;

/// Prepends `"{prefix}/"` to every key and strips it on enumeration.
///
/// Entries of other prefixes sharing the backend are invisible through this
/// view.
pub struct PrefixedStore {
    inner: Arc<dyn ResourceStore>,
    prefix: String,
}

impl PrefixedStore {
    pub fn new(inner: Arc<dyn ResourceStore>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: format!("{}/", prefix.into()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl ResourceStore for PrefixedStore {
    async fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        self.inner.get(&self.full_key(key)).await
    }

    async fn put(&self, key: &str, value: Value) -> EngineResult<()> {
        self.inner.put(&self.full_key(key), value).await
    }

    async fn put_if_absent(&self, key: &str, value: Value) -> EngineResult<bool> {
        self.inner.put_if_absent(&self.full_key(key), value).await
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn enumerate(&self) -> EngineResult<Vec<(String, Value)>> {
        Ok(self
            .inner
            .enumerate()
            .await?
            .into_iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&self.prefix)
                    .map(|rest| (rest.to_string(), v))
            })
            .collect())
    }
}
