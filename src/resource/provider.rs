//! Provider contract
//!
//! A [`ResourceProvider`] holds the business logic for one resource type.
//! Providers receive a [`ProviderRequest`] and answer with
//! [`ResourceResponse`]s; each method may fail with a domain error.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{
    ProvisioningState, ResourceEntry, ResourceInput, StateTransition, SystemData,
};
use crate::scope::ScopeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Get,
    List,
    Delete,
    Action,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Self::Create,
        Self::Get,
        Self::List,
        Self::Delete,
        Self::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::List => "list",
            Self::Delete => "delete",
            Self::Action => "action",
        }
    }

    /// Reads are cheap and latency-sensitive.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Get | Self::List)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::UnknownOperation {
                operation: s.to_string(),
            })
    }
}

/// Request fields a provider can demand before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestField {
    SubscriptionId,
    ResourceGroup,
    ResourceName,
    Location,
    Body,
    ManagementGroupId,
    ParentResourceId,
    Action,
}

impl RequestField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriptionId => "subscription_id",
            Self::ResourceGroup => "resource_group",
            Self::ResourceName => "resource_name",
            Self::Location => "location",
            Self::Body => "body",
            Self::ManagementGroupId => "management_group_id",
            Self::ParentResourceId => "parent_resource_id",
            Self::Action => "action",
        }
    }

    pub fn is_present(&self, request: &ProviderRequest) -> bool {
        fn filled(s: &Option<String>) -> bool {
            s.as_deref().is_some_and(|v| !v.trim().is_empty())
        }

        match self {
            Self::SubscriptionId => filled(&request.subscription_id),
            Self::ResourceGroup => filled(&request.resource_group),
            Self::ResourceName => filled(&request.resource_name),
            Self::Location => filled(&request.location),
            Self::Body => request.body.as_ref().is_some_and(|b| !b.is_null()),
            Self::ManagementGroupId => filled(&request.management_group_id),
            Self::ParentResourceId => filled(&request.parent_resource_id),
            Self::Action => filled(&request.action),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// PUT-style upsert. When false a second create of the same name is a
    /// duplicate.
    #[serde(default)]
    pub update_existing: bool,
}

impl ProviderRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = Some(id.into());
        self
    }

    pub fn resource_group(mut self, name: impl Into<String>) -> Self {
        self.resource_group = Some(name.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn management_group(mut self, id: impl Into<String>) -> Self {
        self.management_group_id = Some(id.into());
        self
    }

    pub fn parent_resource(mut self, id: impl Into<String>) -> Self {
        self.parent_resource_id = Some(id.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn update_existing(mut self, update: bool) -> Self {
        self.update_existing = update;
        self
    }

    pub fn scope_context(&self) -> ScopeContext {
        ScopeContext {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            management_group_id: self.management_group_id.clone(),
            parent_resource_id: self.parent_resource_id.clone(),
            actor: self.actor.clone(),
        }
    }

    pub fn resource_input(&self) -> ResourceInput {
        ResourceInput {
            location: self.location.clone(),
            tags: self.tags.clone(),
            properties: self.body.clone().unwrap_or(Value::Null),
        }
    }

    /// Resource name, or a validation error naming the missing field.
    pub fn require_name(&self) -> EngineResult<&str> {
        match self.resource_name.as_deref() {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(EngineError::from_field_errors([(
                RequestField::ResourceName.as_str(),
                "is required",
            )])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    pub provisioning_state: ProvisioningState,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub system_data: SystemData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<StateTransition>,
}

impl From<ResourceEntry> for ResourceResponse {
    fn from(entry: ResourceEntry) -> Self {
        let r = entry.record;
        Self {
            id: entry.identity,
            name: r.name,
            resource_type: r.resource_type,
            location: r.location,
            tags: r.tags,
            provisioning_state: r.provisioning_state,
            properties: r.properties,
            system_data: r.system_data,
            history: r.history,
        }
    }
}

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn create_or_update(&self, request: &ProviderRequest) -> EngineResult<ResourceResponse>;

    async fn get(&self, request: &ProviderRequest) -> EngineResult<ResourceResponse>;

    async fn list(&self, request: &ProviderRequest) -> EngineResult<Vec<ResourceResponse>>;

    async fn delete(&self, request: &ProviderRequest) -> EngineResult<ResourceResponse>;

    async fn execute_action(&self, request: &ProviderRequest) -> EngineResult<Value>;

    /// Fields checked by the registry before the provider is invoked.
    fn required_fields(&self, operation: Operation) -> Vec<RequestField> {
        use RequestField::*;
        match operation {
            Operation::Create => vec![SubscriptionId, ResourceGroup, ResourceName, Location, Body],
            Operation::Get | Operation::Delete => vec![SubscriptionId, ResourceGroup, ResourceName],
            Operation::List => vec![SubscriptionId],
            Operation::Action => vec![SubscriptionId, ResourceGroup, ResourceName, Action],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_parse() {
        assert_eq!("GET".parse::<Operation>().unwrap(), Operation::Get);
        assert_eq!("action".parse::<Operation>().unwrap(), Operation::Action);
        let err = "patch".parse::<Operation>().unwrap_err();
        assert!(err.to_string().contains("Unknown operation"));
    }

    #[test]
    fn test_request_wire_format() {
        let req: ProviderRequest = serde_json::from_value(json!({
            "subscriptionId": "sub-1",
            "resourceName": "prod-rg",
            "location": "westus",
            "body": {"a": 1}
        }))
        .unwrap();
        assert_eq!(req.subscription_id.as_deref(), Some("sub-1"));
        assert!(!req.update_existing);
        assert!(RequestField::Body.is_present(&req));
        assert!(!RequestField::ResourceGroup.is_present(&req));
    }

    #[test]
    fn test_blank_values_are_missing() {
        let req = ProviderRequest::new().name("  ").body(Value::Null);
        assert!(!RequestField::ResourceName.is_present(&req));
        assert!(!RequestField::Body.is_present(&req));
        assert!(req.require_name().is_err());
    }

    #[test]
    fn test_scope_context_carries_actor() {
        let req = ProviderRequest::new()
            .subscription("s")
            .resource_group("g")
            .actor("alice");
        let ctx = req.scope_context();
        assert_eq!(ctx.resource_group.as_deref(), Some("g"));
        assert_eq!(ctx.actor_or_default(), "alice");
    }
}
