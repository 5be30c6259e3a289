//! Resource Provider Registry
//!
//! Maps `(namespace, resource type)` to the provider that owns it. The
//! registry is a plain synchronous router: resolve, validate, invoke. Retry
//! and state handling live elsewhere.
//!
//! Lookups are case-insensitive, matching how resource namespaces and types
//! are compared in resource identities.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::dispatch::{invoke_provider, validate_request};
use super::provider::{Operation, ProviderRequest, ResourceProvider};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    namespace: String,
    resource_type: String,
}

impl ProviderKey {
    fn new(namespace: &str, resource_type: &str) -> Self {
        Self {
            namespace: namespace.to_lowercase(),
            resource_type: resource_type.to_lowercase(),
        }
    }
}

struct Registration {
    namespace: String,
    resource_type: String,
    provider: Arc<dyn ResourceProvider>,
}

#[derive(Default)]
pub struct ResourceProviderRegistry {
    providers: HashMap<ProviderKey, Registration>,
}

impl ResourceProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `namespace/resource_type`, returning the
    /// provider it replaced, if any.
    pub fn register(
        &mut self,
        namespace: &str,
        resource_type: &str,
        provider: Arc<dyn ResourceProvider>,
    ) -> Option<Arc<dyn ResourceProvider>> {
        tracing::info!(namespace, resource_type, "Registered resource provider");

        self.providers
            .insert(
                ProviderKey::new(namespace, resource_type),
                Registration {
                    namespace: namespace.to_string(),
                    resource_type: resource_type.to_string(),
                    provider,
                },
            )
            .map(|old| old.provider)
    }

    pub fn get(&self, namespace: &str, resource_type: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.providers
            .get(&ProviderKey::new(namespace, resource_type))
            .map(|r| r.provider.clone())
    }

    /// Registered `(namespace, resource type)` pairs, sorted.
    pub fn registered(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .providers
            .values()
            .map(|r| (r.namespace.clone(), r.resource_type.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve the provider, validate `request` against its required fields,
    /// and invoke the method for `operation`. The provider's result is
    /// returned unchanged.
    pub async fn dispatch(
        &self,
        namespace: &str,
        resource_type: &str,
        operation: Operation,
        request: &ProviderRequest,
    ) -> EngineResult<Value> {
        tracing::debug!(namespace, resource_type, %operation, "dispatch");

        let provider = self
            .get(namespace, resource_type)
            .ok_or_else(|| EngineError::ProviderNotFound {
                namespace: namespace.to_string(),
                resource_type: resource_type.to_string(),
            })?;

        validate_request(provider.as_ref(), operation, request)?;
        invoke_provider(provider.as_ref(), operation, request).await
    }
}
