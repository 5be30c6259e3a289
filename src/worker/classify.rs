//! Failure classification
//!
//! Caller errors (validation, conflicts, authorization) are never retried.
//! Everything else is judged by its message: a non-retryable pattern wins
//! over a retryable one, and anything unrecognised is retried.

use serde::Serialize;

use crate::error::{EngineError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Retryable,
    NonRetryable,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable)
    }
}

const RETRYABLE_PATTERNS: &[&str] = &[
    "no provider found",
    "connection",
    "timeout",
    "timed out",
    "temporarily unavailable",
    "busy",
];

const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "validation",
    "invalid",
    "unauthorized",
    "forbidden",
    "unknown operation",
    "unsupported",
];

pub fn classify_message(message: &str) -> FailureClass {
    let message = message.to_lowercase();

    if NON_RETRYABLE_PATTERNS.iter().any(|p| message.contains(p)) {
        return FailureClass::NonRetryable;
    }
    if !RETRYABLE_PATTERNS.iter().any(|p| message.contains(p)) {
        tracing::debug!(%message, "Unclassified failure, treating as retryable");
    }
    FailureClass::Retryable
}

pub fn classify(error: &EngineError) -> FailureClass {
    match error.kind() {
        ErrorKind::Validation
        | ErrorKind::DuplicateResource
        | ErrorKind::NotFound
        | ErrorKind::InvalidTransition
        | ErrorKind::UnknownOperation
        | ErrorKind::Unauthorized => FailureClass::NonRetryable,
        ErrorKind::ProviderNotFound
        | ErrorKind::Unavailable
        | ErrorKind::Io
        | ErrorKind::Provider
        | ErrorKind::Store
        | ErrorKind::Queue
        | ErrorKind::Serialization => classify_message(&error.to_string()),
    }
}
