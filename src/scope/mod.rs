//! Scope model
//!
//! A resource type declares an ordered list of [`ScopeLevel`]s; together with
//! the caller's [`ScopeContext`] they define the domain in which a resource
//! name must be unique.
//!
//! - [`key`] - storage keys and hierarchical identities
//! - [`uniqueness`] - at-most-one-resource-per-scope enforcement

pub mod key;
pub mod uniqueness;

use serde::{Deserialize, Serialize};

pub use key::ScopeKeyBuilder;
pub use uniqueness::{ScopedEntry, UniquenessEngine};

/// Placeholder used when a declared scope value is missing from the context.
pub const UNKNOWN_SCOPE_VALUE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Global,
    Subscription,
    ResourceGroup,
    ManagementGroup,
    ParentResource,
}

impl ScopeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Subscription => "subscription",
            Self::ResourceGroup => "resource_group",
            Self::ManagementGroup => "management_group",
            Self::ParentResource => "parent_resource",
        }
    }
}

/// Per-operation scope values supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_resource_id: Option<String>,
    /// Identity stamped into `createdBy` / `modifiedBy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl ScopeContext {
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

    pub fn management_group(mut self, id: impl Into<String>) -> Self {
        self.management_group_id = Some(id.into());
        self
    }

    pub fn parent_resource(mut self, id: impl Into<String>) -> Self {
        self.parent_resource_id = Some(id.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Explicit value for `level`, if the caller supplied one.
    pub fn get(&self, level: ScopeLevel) -> Option<&str> {
        match level {
            ScopeLevel::Global => None,
            ScopeLevel::Subscription => self.subscription_id.as_deref(),
            ScopeLevel::ResourceGroup => self.resource_group.as_deref(),
            ScopeLevel::ManagementGroup => self.management_group_id.as_deref(),
            ScopeLevel::ParentResource => self.parent_resource_id.as_deref(),
        }
    }

    /// Value for `level`, or [`UNKNOWN_SCOPE_VALUE`] when missing.
    pub fn value_for(&self, level: ScopeLevel) -> &str {
        self.get(level).unwrap_or(UNKNOWN_SCOPE_VALUE)
    }

    pub fn actor_or_default(&self) -> &str {
        self.actor.as_deref().unwrap_or("system")
    }
}

/// Static description of one resource type: who owns it and how it is scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeDescriptor {
    pub namespace: String,
    pub resource_type: String,
    pub scope_levels: Vec<ScopeLevel>,
    /// Bare path segment used instead of `/providers/{ns}/{type}` in the
    /// identity (e.g. `resourceGroups`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_segment: Option<String>,
}

impl ResourceTypeDescriptor {
    pub fn new(
        namespace: impl Into<String>,
        resource_type: impl Into<String>,
        scope_levels: Vec<ScopeLevel>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            resource_type: resource_type.into(),
            scope_levels,
            path_segment: None,
        }
    }

    pub fn with_path_segment(mut self, segment: impl Into<String>) -> Self {
        self.path_segment = Some(segment.into());
        self
    }

    /// `Namespace/type`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.resource_type)
    }

    /// Lowercased qualified name, used as the storage prefix.
    pub fn store_prefix(&self) -> String {
        self.qualified_name().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_values_default_to_unknown() {
        let ctx = ScopeContext::new().subscription("sub-1");
        assert_eq!(ctx.value_for(ScopeLevel::Subscription), "sub-1");
        assert_eq!(ctx.value_for(ScopeLevel::ResourceGroup), UNKNOWN_SCOPE_VALUE);
        assert_eq!(ctx.get(ScopeLevel::ResourceGroup), None);
    }

    #[test]
    fn test_scope_context_wire_names() {
        let ctx: ScopeContext =
            serde_json::from_str(r#"{"subscription_id":"s","resource_group":"g"}"#).unwrap();
        assert_eq!(ctx.subscription_id.as_deref(), Some("s"));
        assert_eq!(ctx.resource_group.as_deref(), Some("g"));
        assert_eq!(ctx.actor_or_default(), "system");
    }

    #[test]
    fn test_store_prefix_is_lowercase() {
        let d = ResourceTypeDescriptor::new(
            "Microsoft.Resources",
            "resourceGroups",
            vec![ScopeLevel::Subscription],
        );
        assert_eq!(d.qualified_name(), "Microsoft.Resources/resourceGroups");
        assert_eq!(d.store_prefix(), "microsoft.resources/resourcegroups");
    }
}
