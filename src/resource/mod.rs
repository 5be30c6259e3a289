//! Resource provider layer
//!
//! Providers own the business logic of one resource type each. The
//! registry routes `(namespace, type, operation)` to them synchronously;
//! asynchronous execution is layered on top by [`crate::offload`].
//!
//! # Architecture
//!
//! - [`provider`] - the provider contract and request/response types
//! - [`registry`] - `(namespace, type)` lookup and dispatch
//! - [`dispatch`] - required-field validation and operation routing
//! - [`builtin`] - scoped providers loaded from embedded YAML definitions
//!
//! # Resource Definitions
//!
//! Built-in types are defined in YAML files under `src/resources/`:
//! - `resources.yaml` - subscriptions and resource groups
//! - `authorization.yaml` - policy definitions and assignments

pub mod builtin;
pub mod dispatch;
pub mod provider;
pub mod registry;

pub use builtin::{
    default_resource_types, register_builtin_providers, ResourceTypeDef, ScopedResourceProvider,
};
pub use provider::{Operation, ProviderRequest, RequestField, ResourceProvider, ResourceResponse};
pub use registry::ResourceProviderRegistry;
