//! Provider dispatch
//!
//! Maps an [`Operation`] onto the matching provider method after checking the
//! provider's declared required fields.

use serde_json::Value;

use super::provider::{Operation, ProviderRequest, ResourceProvider};
use crate::error::{EngineError, EngineResult};

/// Check every field `provider` requires for `operation`. All missing fields
/// are reported in one validation error.
pub fn validate_request(
    provider: &dyn ResourceProvider,
    operation: Operation,
    request: &ProviderRequest,
) -> EngineResult<()> {
    let missing: Vec<(&str, &str)> = provider
        .required_fields(operation)
        .iter()
        .filter(|field| !field.is_present(request))
        .map(|field| (field.as_str(), "is required"))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::from_field_errors(missing))
    }
}

/// Invoke the provider method for `operation`, returning its result as JSON.
pub async fn invoke_provider(
    provider: &dyn ResourceProvider,
    operation: Operation,
    request: &ProviderRequest,
) -> EngineResult<Value> {
    let value = match operation {
        Operation::Create => serde_json::to_value(provider.create_or_update(request).await?)?,
        Operation::Get => serde_json::to_value(provider.get(request).await?)?,
        Operation::List => serde_json::to_value(provider.list(request).await?)?,
        Operation::Delete => serde_json::to_value(provider.delete(request).await?)?,
        Operation::Action => provider.execute_action(request).await?,
    };
    Ok(value)
}
