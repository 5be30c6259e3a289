//! Error types for the resource engine.
//!
//! Every fallible engine operation returns [`EngineResult`]. Callers branch on
//! [`EngineError::kind`] rather than inspecting messages; the worker's retry
//! classifier falls back to message patterns only for opaque provider errors.

use thiserror::Error;

use crate::lifecycle::ProvisioningState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Duplicate resource: {identity} already exists")]
    DuplicateResource { identity: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ProvisioningState,
        to: ProvisioningState,
    },

    #[error("No provider found for {namespace}/{resource_type}")]
    ProviderNotFound {
        namespace: String,
        resource_type: String,
    },

    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Service temporarily unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    DuplicateResource,
    NotFound,
    InvalidTransition,
    ProviderNotFound,
    UnknownOperation,
    Unauthorized,
    Unavailable,
    Provider,
    Store,
    Queue,
    Serialization,
    Io,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::DuplicateResource { .. } => ErrorKind::DuplicateResource,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::ProviderNotFound { .. } => ErrorKind::ProviderNotFound,
            Self::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Store(_) => ErrorKind::Store,
            Self::Queue(_) => ErrorKind::Queue,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Build a validation error from `(field, reason)` pairs.
    ///
    /// Produces `field: reason` entries joined by `; `.
    pub fn from_field_errors<I, F, R>(errors: I) -> Self
    where
        I: IntoIterator<Item = (F, R)>,
        F: AsRef<str>,
        R: AsRef<str>,
    {
        let message = errors
            .into_iter()
            .map(|(field, reason)| format!("{}: {}", field.as_ref(), reason.as_ref()))
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation { message }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_are_joined() {
        let err = EngineError::from_field_errors([
            ("subscription_id", "is required"),
            ("location", "is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: subscription_id: is required; location: is required"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_invalid_transition_names_both_states() {
        let err = EngineError::InvalidTransition {
            from: ProvisioningState::Succeeded,
            to: ProvisioningState::Accepted,
        };
        let msg = err.to_string();
        assert!(msg.contains("Succeeded"));
        assert!(msg.contains("Accepted"));
    }

    #[test]
    fn test_provider_not_found_message() {
        let err = EngineError::ProviderNotFound {
            namespace: "Contoso.Widgets".into(),
            resource_type: "gadgets".into(),
        };
        assert!(err.to_string().starts_with("No provider found"));
    }
}
