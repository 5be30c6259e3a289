//! Storage keys and hierarchical identities
//!
//! The [`ResourceKey`](ScopeKeyBuilder::resource_key) is internal: declared
//! scope values in order plus the name, joined by `:`. Each component is
//! escaped first (`%` as `%25`, `:` as `%3A`) so distinct inputs never join
//! into the same key. The identity is the externally visible path, e.g.
//! `/subscriptions/{s}/resourceGroups/{g}/providers/{ns}/{type}/{name}`.
//! Matching is case-sensitive throughout.

use std::borrow::Cow;

use super::{ResourceTypeDescriptor, ScopeContext, ScopeLevel};
use crate::error::{EngineError, EngineResult};

const KEY_SEPARATOR: &str = ":";

fn encode_component(value: &str) -> Cow<'_, str> {
    if value.contains(['%', ':']) {
        Cow::Owned(value.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(value)
    }
}

#[derive(Debug, Clone)]
pub struct ScopeKeyBuilder {
    descriptor: ResourceTypeDescriptor,
}

impl ScopeKeyBuilder {
    pub fn new(descriptor: ResourceTypeDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &ResourceTypeDescriptor {
        &self.descriptor
    }

    fn scoped_levels(&self) -> impl Iterator<Item = ScopeLevel> + '_ {
        self.descriptor
            .scope_levels
            .iter()
            .copied()
            .filter(|l| *l != ScopeLevel::Global)
    }

    /// Deterministic storage key for `name` under `ctx`.
    pub fn resource_key(&self, name: &str, ctx: &ScopeContext) -> String {
        let mut parts: Vec<Cow<'_, str>> = self
            .scoped_levels()
            .map(|l| encode_component(ctx.value_for(l)))
            .collect();
        parts.push(encode_component(name));
        parts.join(KEY_SEPARATOR)
    }

    /// Key prefix shared by every resource in `ctx`, when all declared levels
    /// carry explicit values.
    pub fn key_prefix(&self, ctx: &ScopeContext) -> Option<String> {
        let values: Option<Vec<Cow<'_, str>>> = self
            .scoped_levels()
            .map(|l| ctx.get(l).map(encode_component))
            .collect();
        let values = values?;
        if values.is_empty() {
            return None;
        }
        Some(format!("{}{}", values.join(KEY_SEPARATOR), KEY_SEPARATOR))
    }

    /// Rejects `/` in the name and in non-parent scope values, which would
    /// make one identity path readable as another.
    pub fn check_segments(&self, name: &str, ctx: &ScopeContext) -> EngineResult<()> {
        if name.contains('/') {
            return Err(EngineError::validation("name: must not contain '/'"));
        }
        for level in self.scoped_levels() {
            if level == ScopeLevel::ParentResource {
                continue;
            }
            if ctx.value_for(level).contains('/') {
                return Err(EngineError::validation(format!(
                    "{}: must not contain '/'",
                    level.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Scope portion of the identity, without the type and name suffix.
    fn scope_path(&self, ctx: &ScopeContext) -> (String, bool) {
        let mut path = String::new();
        let mut under_parent = false;

        for level in self.descriptor.scope_levels.iter().copied() {
            match level {
                ScopeLevel::Global => {}
                ScopeLevel::Subscription => {
                    path.push_str(&format!("/subscriptions/{}", ctx.value_for(level)));
                }
                ScopeLevel::ResourceGroup => {
                    path.push_str(&format!("/resourceGroups/{}", ctx.value_for(level)));
                }
                ScopeLevel::ManagementGroup => {
                    path.push_str(&format!(
                        "/providers/Microsoft.Management/managementGroups/{}",
                        ctx.value_for(level)
                    ));
                }
                ScopeLevel::ParentResource => {
                    // Parent identities are already fully qualified paths.
                    let parent = ctx.value_for(level).trim_end_matches('/');
                    path = if parent.starts_with('/') {
                        parent.to_string()
                    } else {
                        format!("/{}", parent)
                    };
                    under_parent = true;
                }
            }
        }

        (path, under_parent)
    }

    /// Externally visible identity of `name` under `ctx`.
    pub fn identity(&self, name: &str, ctx: &ScopeContext) -> String {
        let (path, under_parent) = self.scope_path(ctx);
        let d = &self.descriptor;

        match (&d.path_segment, under_parent) {
            (Some(segment), _) => format!("{}/{}/{}", path, segment, name),
            (None, true) => format!("{}/{}/{}", path, d.resource_type, name),
            (None, false) => format!(
                "{}/providers/{}/{}/{}",
                path, d.namespace, d.resource_type, name
            ),
        }
    }

    /// Identity fragments a resource in `ctx` must contain. Levels without an
    /// explicit value do not narrow the match.
    fn identity_filters(&self, ctx: &ScopeContext) -> Vec<String> {
        self.scoped_levels()
            .filter_map(|level| {
                let value = ctx.get(level)?;
                let fragment = match level {
                    ScopeLevel::Subscription => format!("/subscriptions/{}/", value),
                    ScopeLevel::ResourceGroup => format!("/resourceGroups/{}/", value),
                    ScopeLevel::ManagementGroup => format!("/managementGroups/{}/", value),
                    ScopeLevel::ParentResource => {
                        format!("{}/", value.trim_end_matches('/'))
                    }
                    ScopeLevel::Global => return None,
                };
                Some(fragment)
            })
            .collect()
    }

    /// Whether a stored entry belongs to `ctx`, judged by its key or identity.
    pub fn matches_scope(&self, key: &str, identity: &str, ctx: &ScopeContext) -> bool {
        if let Some(prefix) = self.key_prefix(ctx) {
            if key.starts_with(&prefix) {
                return true;
            }
        }

        let identity = format!("{}/", identity);
        self.identity_filters(ctx)
            .iter()
            .all(|fragment| identity.contains(fragment.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(levels: Vec<ScopeLevel>) -> ScopeKeyBuilder {
        ScopeKeyBuilder::new(ResourceTypeDescriptor::new(
            "Contoso.Storage",
            "vaults",
            levels,
        ))
    }

    #[test]
    fn test_resource_key_follows_declared_order() {
        let b = builder(vec![ScopeLevel::Subscription, ScopeLevel::ResourceGroup]);
        let ctx = ScopeContext::new().subscription("sub-1").resource_group("rg-a");
        assert_eq!(b.resource_key("v1", &ctx), "sub-1:rg-a:v1");
    }

    #[test]
    fn test_global_key_is_bare_name() {
        let b = builder(vec![ScopeLevel::Global]);
        assert_eq!(b.resource_key("v1", &ScopeContext::new()), "v1");
        assert_eq!(
            b.identity("v1", &ScopeContext::new()),
            "/providers/Contoso.Storage/vaults/v1"
        );
        assert_eq!(b.key_prefix(&ScopeContext::new()), None);
    }

    #[test]
    fn test_resource_group_scoped_identity() {
        let b = builder(vec![ScopeLevel::Subscription, ScopeLevel::ResourceGroup]);
        let ctx = ScopeContext::new().subscription("s").resource_group("g");
        assert_eq!(
            b.identity("v1", &ctx),
            "/subscriptions/s/resourceGroups/g/providers/Contoso.Storage/vaults/v1"
        );
    }

    #[test]
    fn test_management_group_identity() {
        let b = builder(vec![ScopeLevel::ManagementGroup]);
        let ctx = ScopeContext::new().management_group("root-mg");
        assert_eq!(
            b.identity("v1", &ctx),
            "/providers/Microsoft.Management/managementGroups/root-mg/providers/Contoso.Storage/vaults/v1"
        );
    }

    #[test]
    fn test_path_segment_identity() {
        let b = ScopeKeyBuilder::new(
            ResourceTypeDescriptor::new(
                "Microsoft.Resources",
                "resourceGroups",
                vec![ScopeLevel::Subscription],
            )
            .with_path_segment("resourceGroups"),
        );
        let ctx = ScopeContext::new().subscription("sub-1");
        assert_eq!(b.identity("prod-rg", &ctx), "/subscriptions/sub-1/resourceGroups/prod-rg");
    }

    #[test]
    fn test_child_resource_identity() {
        let b = builder(vec![ScopeLevel::ParentResource]);
        let ctx = ScopeContext::new()
            .parent_resource("/subscriptions/s/resourceGroups/g/providers/Contoso.Storage/accounts/a1/");
        assert_eq!(
            b.identity("v1", &ctx),
            "/subscriptions/s/resourceGroups/g/providers/Contoso.Storage/accounts/a1/vaults/v1"
        );
    }

    #[test]
    fn test_missing_values_use_unknown() {
        let b = builder(vec![ScopeLevel::Subscription, ScopeLevel::ResourceGroup]);
        let ctx = ScopeContext::new().subscription("s");
        assert_eq!(b.resource_key("v1", &ctx), "s:unknown:v1");
        assert!(b.identity("v1", &ctx).contains("/resourceGroups/unknown/"));
        assert_eq!(b.key_prefix(&ctx), None);
    }

    #[test]
    fn test_matches_scope_by_identity() {
        let b = builder(vec![ScopeLevel::Subscription, ScopeLevel::ResourceGroup]);
        let ctx = ScopeContext::new().subscription("s").resource_group("g");
        let id = b.identity("v1", &ctx);

        assert!(b.matches_scope("legacy-name", &id, &ScopeContext::new().subscription("s")));
        assert!(b.matches_scope("legacy-name", &id, &ctx));
        assert!(!b.matches_scope(
            "legacy-name",
            &id,
            &ScopeContext::new().subscription("s").resource_group("other")
        ));
        assert!(!b.matches_scope("legacy-name", &id, &ScopeContext::new().subscription("s2")));
    }

    #[test]
    fn test_matches_scope_by_key_prefix() {
        let b = builder(vec![ScopeLevel::Subscription]);
        let ctx = ScopeContext::new().subscription("s");
        assert!(b.matches_scope("s:v1", "not-an-identity", &ctx));
    }

    #[test]
    fn test_separator_in_values_does_not_collide() {
        let b = builder(vec![ScopeLevel::Subscription]);
        let x = ScopeContext::new().subscription("x");
        let xy = ScopeContext::new().subscription("x:y");

        let first = b.resource_key("y:z", &x);
        let second = b.resource_key("z", &xy);
        assert_ne!(first, second);
        assert_eq!(first, "x:y%3Az");
        assert_eq!(second, "x%3Ay:z");

        // The prefix of `x` must not claim entries of `x:y`.
        assert!(!b.matches_scope(&second, &b.identity("z", &xy), &x));
        assert!(b.matches_scope(&first, &b.identity("y:z", &x), &x));
    }

    #[test]
    fn test_percent_is_escaped_before_separator() {
        let b = builder(vec![ScopeLevel::Subscription]);
        let ctx = ScopeContext::new().subscription("s");
        assert_ne!(b.resource_key("a%3Ab", &ctx), b.resource_key("a:b", &ctx));
        assert_eq!(b.resource_key("a%3Ab", &ctx), "s:a%253Ab");
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let b = builder(vec![ScopeLevel::Subscription, ScopeLevel::ResourceGroup]);
        let upper = ScopeContext::new().subscription("SUB-1").resource_group("g");
        let key = b.resource_key("v1", &upper);
        let id = b.identity("v1", &upper);

        assert!(!b.matches_scope(&key, &id, &ScopeContext::new().subscription("sub-1")));
        assert!(b.matches_scope(&key, &id, &ScopeContext::new().subscription("SUB-1")));
    }

    #[test]
    fn test_check_segments_rejects_slashes() {
        let b = builder(vec![ScopeLevel::Subscription]);
        let ctx = ScopeContext::new().subscription("s");
        assert!(b.check_segments("v1", &ctx).is_ok());

        let err = b.check_segments("a/b", &ctx).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: name: must not contain '/'");

        let err = b
            .check_segments("v1", &ScopeContext::new().subscription("s/resourceGroups/g"))
            .unwrap_err();
        assert!(err.to_string().contains("subscription: must not contain '/'"));

        let child = builder(vec![ScopeLevel::ParentResource]);
        let parent = ScopeContext::new().parent_resource("/subscriptions/s/providers/A.B/c/d");
        assert!(child.check_segments("v1", &parent).is_ok());
    }
}
