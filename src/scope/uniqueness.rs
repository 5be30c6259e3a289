//! Scope-aware uniqueness
//!
//! Enforces at most one resource per (scope, name) for a resource type.
//! Creation goes through [`ResourceStore::put_if_absent`], so two concurrent
//! creators of the same key cannot both succeed even across engine instances
//! sharing a store.
//!
//! Records written before scoping was introduced live under their bare name;
//! lookups fall back to that legacy key.
//!
//! Read-modify-write sequences on one key (update, state changes, delete)
//! serialize on [`UniquenessEngine::lock`]. The lock is per process.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{ScopeContext, ScopeKeyBuilder};
use crate::error::{EngineError, EngineResult};
use crate::store::ResourceStore;

/// On-store envelope: the identity next to the opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResource {
    identity: String,
    data: Value,
}

/// A resolved store entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedEntry {
    pub key: String,
    pub identity: String,
    pub data: Value,
}

impl ScopedEntry {
    /// Decode a raw store value. Legacy values have no envelope; their key
    /// doubles as identity.
    fn decode(key: &str, value: Value) -> Self {
        match serde_json::from_value::<StoredResource>(value.clone()) {
            Ok(stored) => Self {
                key: key.to_string(),
                identity: stored.identity,
                data: stored.data,
            },
            Err(_) => Self {
                key: key.to_string(),
                identity: key.to_string(),
                data: value,
            },
        }
    }
}

pub struct UniquenessEngine {
    keys: ScopeKeyBuilder,
    store: Arc<dyn ResourceStore>,
    /// key -> identity of entries this process has seen
    index: RwLock<HashMap<String, String>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UniquenessEngine {
    pub fn new(keys: ScopeKeyBuilder, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            keys,
            store,
            index: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> &ScopeKeyBuilder {
        &self.keys
    }

    /// Exclusive hold on the scoped key of `name` until the guard drops.
    pub async fn lock(&self, name: &str, ctx: &ScopeContext) -> OwnedMutexGuard<()> {
        let key = self.keys.resource_key(name, ctx);
        let slot = {
            let mut locks = self.locks.lock().await;
            // Unheld slots are only referenced by the map.
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            locks.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Store `data` under the scoped key for `name`.
    ///
    /// Fails with [`EngineError::DuplicateResource`] carrying the existing
    /// identity if the scoped key or the legacy bare-name key is taken.
    pub async fn create(
        &self,
        name: &str,
        data: Value,
        ctx: &ScopeContext,
    ) -> EngineResult<ScopedEntry> {
        self.keys.check_segments(name, ctx)?;
        let key = self.keys.resource_key(name, ctx);

        if let Some(identity) = self.index.read().await.get(&key).cloned() {
            return Err(EngineError::DuplicateResource { identity });
        }

        if key != name {
            if let Some(legacy) = self.store.get(name).await? {
                let existing = ScopedEntry::decode(name, legacy);
                return Err(EngineError::DuplicateResource {
                    identity: existing.identity,
                });
            }
        }

        let identity = self.keys.identity(name, ctx);
        let stored = StoredResource {
            identity: identity.clone(),
            data,
        };

        if !self
            .store
            .put_if_absent(&key, serde_json::to_value(&stored)?)
            .await?
        {
            let existing = match self.store.get(&key).await? {
                Some(value) => ScopedEntry::decode(&key, value).identity,
                None => identity,
            };
            self.index.write().await.insert(key, existing.clone());
            return Err(EngineError::DuplicateResource { identity: existing });
        }

        tracing::debug!(key = %key, identity = %identity, "Stored scoped resource");
        self.index.write().await.insert(key.clone(), identity.clone());

        Ok(ScopedEntry {
            key,
            identity,
            data: stored.data,
        })
    }

    /// Look up `name` under `ctx`, falling back to the legacy bare-name key.
    pub async fn get(&self, name: &str, ctx: &ScopeContext) -> EngineResult<Option<ScopedEntry>> {
        let key = self.keys.resource_key(name, ctx);

        if let Some(value) = self.store.get(&key).await? {
            return Ok(Some(ScopedEntry::decode(&key, value)));
        }

        if key != name {
            if let Some(value) = self.store.get(name).await? {
                return Ok(Some(ScopedEntry::decode(name, value)));
            }
        }

        Ok(None)
    }

    /// All entries visible in `ctx`. Linear scan over the store.
    pub async fn list(&self, ctx: &ScopeContext) -> EngineResult<Vec<ScopedEntry>> {
        Ok(self
            .store
            .enumerate()
            .await?
            .into_iter()
            .map(|(key, value)| ScopedEntry::decode(&key, value))
            .filter(|entry| self.keys.matches_scope(&entry.key, &entry.identity, ctx))
            .collect())
    }

    /// Overwrite the payload of an existing entry, keeping its key and identity.
    pub async fn replace(
        &self,
        name: &str,
        ctx: &ScopeContext,
        data: Value,
    ) -> EngineResult<ScopedEntry> {
        let Some(existing) = self.get(name, ctx).await? else {
            return Err(EngineError::not_found(self.keys.identity(name, ctx)));
        };

        let stored = StoredResource {
            identity: existing.identity.clone(),
            data,
        };
        self.store
            .put(&existing.key, serde_json::to_value(&stored)?)
            .await?;

        Ok(ScopedEntry {
            key: existing.key,
            identity: existing.identity,
            data: stored.data,
        })
    }

    /// Remove `name` under `ctx`. Returns whether an entry was removed.
    pub async fn delete(&self, name: &str, ctx: &ScopeContext) -> EngineResult<bool> {
        let key = self.keys.resource_key(name, ctx);

        let removed = if self.store.delete(&key).await? {
            true
        } else if key != name {
            self.store.delete(name).await?
        } else {
            false
        };

        self.index.write().await.remove(&key);
        if removed {
            tracing::debug!(key = %key, "Removed scoped resource");
        }
        Ok(removed)
    }
}
