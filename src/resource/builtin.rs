//! Built-in resource types
//!
//! Resource type definitions are loaded from YAML files embedded at compile
//! time, so adding a scoped type needs no code. Each definition becomes a
//! [`ScopedResourceProvider`] backed by its own [`ResourcePipeline`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{Operation, ProviderRequest, RequestField, ResourceProvider, ResourceResponse};
use super::registry::ResourceProviderRegistry;
use crate::config::ProvisioningConfig;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{
    ProvisioningState, ProvisioningStateMachine, ResourcePipeline, ResourceSchema, SchemaValidator,
};
use crate::scope::{ResourceTypeDescriptor, ScopeLevel};
use crate::store::{PrefixedStore, ResourceStore};

/// Embedded resource type definitions (compiled into the binary)
const DEFINITION_FILES: &[&str] = &[
    include_str!("../resources/resources.yaml"),
    include_str!("../resources/authorization.yaml"),
];

/// Resource type definition from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceTypeDef {
    pub namespace: String,
    pub resource_type: String,
    #[serde(default)]
    pub scope_levels: Vec<ScopeLevel>,
    #[serde(default)]
    pub path_segment: Option<String>,
    /// Fields demanded on create in addition to scope fields and the name
    #[serde(default)]
    pub create_requires: Vec<RequestField>,
    #[serde(default)]
    pub schema: Option<ResourceSchema>,
}

impl ResourceTypeDef {
    pub fn descriptor(&self) -> ResourceTypeDescriptor {
        let descriptor = ResourceTypeDescriptor::new(
            &self.namespace,
            &self.resource_type,
            self.scope_levels.clone(),
        );
        match &self.path_segment {
            Some(segment) => descriptor.with_path_segment(segment),
            None => descriptor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    resource_types: Vec<ResourceTypeDef>,
}

/// Every built-in resource type definition.
pub fn default_resource_types() -> EngineResult<Vec<ResourceTypeDef>> {
    let mut defs = Vec::new();
    for content in DEFINITION_FILES {
        let file: DefinitionFile = serde_yaml::from_str(content).map_err(|e| {
            EngineError::Provider(format!("Failed to parse embedded resource definition: {}", e))
        })?;
        defs.extend(file.resource_types);
    }
    Ok(defs)
}

/// Register a [`ScopedResourceProvider`] for every built-in type. All types
/// share `store`, each under its own key prefix.
pub fn register_builtin_providers(
    registry: &mut ResourceProviderRegistry,
    store: Arc<dyn ResourceStore>,
    config: &ProvisioningConfig,
) -> EngineResult<usize> {
    let defs = default_resource_types()?;
    let count = defs.len();

    for def in defs {
        let provider = ScopedResourceProvider::from_def(&def, store.clone(), config);
        registry.register(&def.namespace, &def.resource_type, Arc::new(provider));
    }

    tracing::info!(count, "Registered built-in resource providers");
    Ok(count)
}

/// Provider whose storage, uniqueness and lifecycle come entirely from a
/// [`ResourcePipeline`].
pub struct ScopedResourceProvider {
    pipeline: ResourcePipeline,
    create_requires: Vec<RequestField>,
}

impl ScopedResourceProvider {
    pub fn new(pipeline: ResourcePipeline) -> Self {
        Self {
            pipeline,
            create_requires: Vec::new(),
        }
    }

    pub fn from_def(
        def: &ResourceTypeDef,
        store: Arc<dyn ResourceStore>,
        config: &ProvisioningConfig,
    ) -> Self {
        let descriptor = def.descriptor();
        let prefixed = Arc::new(PrefixedStore::new(store, descriptor.store_prefix()));

        let mut pipeline = ResourcePipeline::new(descriptor, prefixed)
            .with_state_advancer(ProvisioningStateMachine::new(config.track_history))
            .with_mode(config.mode);
        if let Some(schema) = &def.schema {
            pipeline = pipeline.with_validator(SchemaValidator::new(schema.clone()));
        }

        Self::new(pipeline).with_create_requirements(def.create_requires.clone())
    }

    pub fn with_create_requirements(mut self, fields: Vec<RequestField>) -> Self {
        self.create_requires = fields;
        self
    }

    pub fn pipeline(&self) -> &ResourcePipeline {
        &self.pipeline
    }

    /// Request fields carrying the declared scope values, in order.
    fn scope_fields(&self) -> Vec<RequestField> {
        self.pipeline
            .descriptor()
            .scope_levels
            .iter()
            .filter_map(|level| match level {
                ScopeLevel::Global => None,
                ScopeLevel::Subscription => Some(RequestField::SubscriptionId),
                ScopeLevel::ResourceGroup => Some(RequestField::ResourceGroup),
                ScopeLevel::ManagementGroup => Some(RequestField::ManagementGroupId),
                ScopeLevel::ParentResource => Some(RequestField::ParentResourceId),
            })
            .collect()
    }

    async fn advance(&self, request: &ProviderRequest) -> EngineResult<Value> {
        let name = request.require_name()?;
        let target = request
            .body
            .as_ref()
            .and_then(|b| b.get("state"))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::from_field_errors([("state", "is required")]))?;
        let to = ProvisioningState::parse(target).ok_or_else(|| {
            EngineError::from_field_errors([("state", format!("'{}' is not a provisioning state", target))])
        })?;

        let entry = self
            .pipeline
            .advance_state(name, &request.scope_context(), to)
            .await?;
        Ok(serde_json::to_value(ResourceResponse::from(entry))?)
    }

    async fn history(&self, request: &ProviderRequest) -> EngineResult<Value> {
        let response = self.get(request).await?;
        Ok(json!({
            "id": response.id,
            "provisioningState": response.provisioning_state,
            "history": response.history,
        }))
    }
}

#[async_trait]
impl ResourceProvider for ScopedResourceProvider {
    async fn create_or_update(&self, request: &ProviderRequest) -> EngineResult<ResourceResponse> {
        let name = request.require_name()?;
        let ctx = request.scope_context();
        let input = request.resource_input();

        let entry = if request.update_existing {
            self.pipeline.upsert(name, input, &ctx).await?
        } else {
            self.pipeline.create(name, input, &ctx).await?
        };
        Ok(entry.into())
    }

    async fn get(&self, request: &ProviderRequest) -> EngineResult<ResourceResponse> {
        let name = request.require_name()?;
        let ctx = request.scope_context();

        match self.pipeline.get(name, &ctx).await? {
            Some(entry) => Ok(entry.into()),
            None => Err(EngineError::not_found(self.pipeline.identity(name, &ctx))),
        }
    }

    async fn list(&self, request: &ProviderRequest) -> EngineResult<Vec<ResourceResponse>> {
        let entries = self.pipeline.list(&request.scope_context()).await?;
        Ok(entries.into_iter().map(ResourceResponse::from).collect())
    }

    async fn delete(&self, request: &ProviderRequest) -> EngineResult<ResourceResponse> {
        let name = request.require_name()?;
        let entry = self.pipeline.delete(name, &request.scope_context()).await?;
        Ok(entry.into())
    }

    async fn execute_action(&self, request: &ProviderRequest) -> EngineResult<Value> {
        let action = request.action.as_deref().unwrap_or_default();

        if action.eq_ignore_ascii_case("advanceState") {
            self.advance(request).await
        } else if action.eq_ignore_ascii_case("history") {
            self.history(request).await
        } else {
            Err(EngineError::UnknownOperation {
                operation: format!("action '{}'", action),
            })
        }
    }

    fn required_fields(&self, operation: Operation) -> Vec<RequestField> {
        let scope = self.scope_fields();
        let mut fields = match operation {
            // Listing may stop at the outermost scope.
            Operation::List => return scope.into_iter().take(1).collect(),
            _ => scope,
        };

        fields.push(RequestField::ResourceName);
        match operation {
            Operation::Create => fields.extend(self.create_requires.iter().copied()),
            Operation::Action => fields.push(RequestField::Action),
            _ => {}
        }
        fields
    }
}
