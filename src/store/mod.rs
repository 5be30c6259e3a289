//! Resource storage abstraction
//!
//! The engine persists scoped resources through the [`ResourceStore`] trait,
//! a key-value store keyed by opaque strings. All mutation goes through the
//! uniqueness engine so key computation stays in one place.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process map, used by tests and the default binary
//! - [`JsonFileStore`] - durable JSON document, rewritten on every mutation
//! - [`PrefixedStore`] - gives each resource type its own key namespace on a
//!   shared backend

mod file;
mod memory;
mod prefixed;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineResult;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use prefixed::PrefixedStore;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, key: &str) -> EngineResult<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> EngineResult<()>;

    /// Insert only if no entry exists at `key`. Returns `false` when the key
    /// was already taken. Must be atomic with respect to other callers.
    async fn put_if_absent(&self, key: &str, value: Value) -> EngineResult<bool>;

    /// Remove the entry at `key`. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> EngineResult<bool>;

    /// All entries, in key order.
    async fn enumerate(&self) -> EngineResult<Vec<(String, Value)>>;
}
