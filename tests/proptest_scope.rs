//! Property-based tests using proptest
//!
//! These tests verify scope keys, hierarchical identities, uniqueness,
//! the provisioning state machine and failure classification using
//! randomized inputs.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use tarm::lifecycle::{ProvisioningState, ProvisioningStateMachine, ResourceRecord, StateAdvancer};
use tarm::scope::{ResourceTypeDescriptor, ScopeContext, ScopeKeyBuilder, ScopeLevel, UniquenessEngine};
use tarm::store::MemoryStore;
use tarm::worker::{classify_message, FailureClass};
use tarm::ErrorKind;

/// Generate a resource or scope name, including the key separator and the
/// escape character
fn arb_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9:%._-]{0,30}"
}

/// Generate a scope context with subscription and resource group set
fn arb_context() -> impl Strategy<Value = ScopeContext> {
    (arb_name(), arb_name())
        .prop_map(|(sub, rg)| ScopeContext::new().subscription(sub).resource_group(rg))
}

/// Generate a (from, to) pair on one side of the transition graph
fn arb_transition(allowed: bool) -> impl Strategy<Value = (ProvisioningState, ProvisioningState)> {
    let pairs: Vec<_> = ProvisioningState::ALL
        .into_iter()
        .flat_map(|from| ProvisioningState::ALL.into_iter().map(move |to| (from, to)))
        .filter(|(from, to)| from.can_transition_to(*to) == allowed)
        .collect();
    prop::sample::select(pairs)
}

fn vault_keys() -> ScopeKeyBuilder {
    ScopeKeyBuilder::new(ResourceTypeDescriptor::new(
        "Contoso.Storage",
        "vaults",
        vec![ScopeLevel::Subscription, ScopeLevel::ResourceGroup],
    ))
}

// =============================================================================
// Keys and identities
// =============================================================================

proptest! {
    /// Same name and context always produce the same key and identity
    #[test]
    fn key_is_deterministic(name in arb_name(), ctx in arb_context()) {
        let keys = vault_keys();
        prop_assert_eq!(keys.resource_key(&name, &ctx), keys.resource_key(&name, &ctx.clone()));
        prop_assert_eq!(keys.identity(&name, &ctx), keys.identity(&name, &ctx.clone()));
    }

    /// Contexts differing in subscription never share a key or identity
    #[test]
    fn different_subscriptions_are_isolated(
        name in arb_name(),
        sub_a in arb_name(),
        sub_b in arb_name(),
        rg in arb_name(),
    ) {
        prop_assume!(sub_a != sub_b);
        let keys = vault_keys();
        let a = ScopeContext::new().subscription(sub_a).resource_group(rg.clone());
        let b = ScopeContext::new().subscription(sub_b).resource_group(rg);

        prop_assert_ne!(keys.resource_key(&name, &a), keys.resource_key(&name, &b));
        prop_assert_ne!(keys.identity(&name, &a), keys.identity(&name, &b));
    }

    /// Identities end with provider namespace, type and name
    #[test]
    fn identity_ends_with_type_and_name(name in arb_name(), ctx in arb_context()) {
        let identity = vault_keys().identity(&name, &ctx);
        let expected_suffix = format!("/providers/Contoso.Storage/vaults/{}", name);
        prop_assert!(identity.starts_with("/subscriptions/"));
        prop_assert!(identity.ends_with(&expected_suffix));
    }

    /// A resource always matches the scope it was created in
    #[test]
    fn resource_matches_own_scope(name in arb_name(), ctx in arb_context()) {
        let keys = vault_keys();
        let key = keys.resource_key(&name, &ctx);
        let identity = keys.identity(&name, &ctx);
        prop_assert!(keys.matches_scope(&key, &identity, &ctx));
    }

    /// Moving a `:`-separated fragment between scope value and name never
    /// lands on another resource's key or scope
    #[test]
    fn separator_in_values_keeps_keys_distinct(a in arb_name(), b in arb_name(), c in arb_name()) {
        let keys = ScopeKeyBuilder::new(ResourceTypeDescriptor::new(
            "Contoso.Storage",
            "vaults",
            vec![ScopeLevel::Subscription],
        ));
        let joined_scope = ScopeContext::new().subscription(format!("{}:{}", a, b));
        let plain_scope = ScopeContext::new().subscription(a.clone());
        let joined_name = format!("{}:{}", b, c);

        let left = keys.resource_key(&c, &joined_scope);
        let right = keys.resource_key(&joined_name, &plain_scope);
        prop_assert_ne!(&left, &right);
        prop_assert!(!keys.matches_scope(&left, &keys.identity(&c, &joined_scope), &plain_scope));
    }
}

// =============================================================================
// Uniqueness
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The second create of a name in one scope fails with the first identity
    #[test]
    fn second_create_in_scope_is_duplicate(name in arb_name(), ctx in arb_context()) {
        let engine = UniquenessEngine::new(vault_keys(), Arc::new(MemoryStore::new()));

        let (first, second) = tokio_test::block_on(async {
            let first = engine.create(&name, json!({"n": 1}), &ctx).await;
            let second = engine.create(&name, json!({"n": 2}), &ctx).await;
            (first, second)
        });

        let first = first.unwrap();
        let err = second.unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::DuplicateResource);
        prop_assert!(err.to_string().contains(&first.identity));
    }
}

// =============================================================================
// Provisioning state machine
// =============================================================================

proptest! {
    /// Transitions outside the graph fail and leave the record untouched
    #[test]
    fn disallowed_transition_leaves_record_unchanged((from, to) in arb_transition(false)) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        let mut record = ResourceRecord::new("r1", "Contoso.Storage/vaults");
        record.provisioning_state = from;
        record.system_data.modified_time = Some(t0);
        let before = record.clone();

        let err = ProvisioningStateMachine::default()
            .advance(&mut record, to, "alice", t1)
            .unwrap_err();

        prop_assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        prop_assert_eq!(record, before);
    }

    /// Allowed transitions move the state and refresh the modification stamp
    #[test]
    fn allowed_transition_updates_state((from, to) in arb_transition(true)) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut record = ResourceRecord::new("r1", "Contoso.Storage/vaults");
        record.provisioning_state = from;

        ProvisioningStateMachine::default()
            .advance(&mut record, to, "bob", now)
            .unwrap();

        prop_assert_eq!(record.provisioning_state, to);
        prop_assert_eq!(record.system_data.modified_time, Some(now));
        prop_assert_eq!(record.history.last().map(|t| t.state), Some(to));
    }
}

// =============================================================================
// Failure classification
// =============================================================================

proptest! {
    /// A non-retryable marker wins over any surrounding text
    #[test]
    fn non_retryable_marker_wins(
        prefix in "[ a-z]{0,20}",
        suffix in "[ a-z]{0,20}",
        marker in prop_oneof!["validation", "Invalid", "UNAUTHORIZED", "forbidden"],
    ) {
        let message = format!("{} connection timeout {} {}", prefix, marker, suffix);
        prop_assert_eq!(classify_message(&message), FailureClass::NonRetryable);
    }

    /// Classification never panics and is stable
    #[test]
    fn classification_is_deterministic(message in ".*") {
        prop_assert_eq!(classify_message(&message), classify_message(&message));
    }
}
