//! Error types for dictum operations.
//!
//! This module defines the canonical error taxonomy used throughout the
//! engine. All subsystems return `Result<T, EngineError>`; services translate
//! low-level failures into this taxonomy and transports translate it to HTTP
//! status codes via [`EngineError::http_code`].

use rusqlite;
use std::env;
use std::io;
use thiserror::Error;

/// Canonical error type for all engine operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Several variants auto-convert from library errors via `#[from]`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// SQLite database error (auto-converts from `rusqlite::Error`)
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode/decode error on a write path
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] env::VarError),

    /// Bad shape, out-of-range value, or unknown enum member
    #[error("Validation error: {0}")]
    Validation(String),

    /// Owner credential does not match the corpus identity
    #[error("Ownership denied: {0}")]
    OwnershipDenied(String),

    /// Operation rejected by the declarative policy before any mutation
    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    /// Resource not found (session, job, export, artifact)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backward or skipped state-machine transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Job queue at capacity; caller should retry later
    #[error("Back-pressure: {0}")]
    BackPressure(String),

    /// Provider unreachable or returned a transport failure
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider rejected the call for rate limiting
    #[error("Provider rate limited: {0}")]
    ProviderRateLimited(String),

    /// Provider rejected the request as malformed
    #[error("Provider invalid request: {0}")]
    ProviderInvalidRequest(String),

    /// Store-level consistency failure during an append or read
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Fatal: a group shrank between opens. The store latches read-only.
    #[error("Mutation detected: {0}")]
    MutationDetected(String),

    /// Corpus file already exists and validates
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Stored schema version is unknown to this build
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Anything that escaped the taxonomy
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// HTTP status code a transport adapter should map this error to.
    pub fn http_code(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::OwnershipDenied(_) => 403,
            EngineError::PolicyDenied(_) => 403,
            EngineError::NotFound(_) => 404,
            EngineError::InvalidTransition(_) => 409,
            EngineError::AlreadyInitialized(_) => 409,
            EngineError::ProviderInvalidRequest(_) => 422,
            EngineError::ProviderRateLimited(_) => 429,
            EngineError::BackPressure(_) => 503,
            EngineError::ProviderUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Stable machine-readable class name, safe to log and to place in the
    /// response envelope. Never carries provider message text.
    pub fn class(&self) -> &'static str {
        match self {
            EngineError::Rusqlite(_) => "InternalError",
            EngineError::Io(_) => "InternalError",
            EngineError::Json(_) => "InternalError",
            EngineError::EnvVar(_) => "InternalError",
            EngineError::Validation(_) => "ValidationError",
            EngineError::OwnershipDenied(_) => "OwnershipDenied",
            EngineError::PolicyDenied(_) => "PolicyDenied",
            EngineError::NotFound(_) => "NotFound",
            EngineError::InvalidTransition(_) => "InvalidTransition",
            EngineError::BackPressure(_) => "BackPressure",
            EngineError::ProviderUnavailable(_) => "ProviderUnavailable",
            EngineError::ProviderRateLimited(_) => "ProviderRateLimited",
            EngineError::ProviderInvalidRequest(_) => "ProviderInvalidRequest",
            EngineError::Integrity(_) => "IntegrityError",
            EngineError::MutationDetected(_) => "MutationDetected",
            EngineError::AlreadyInitialized(_) => "AlreadyInitialized",
            EngineError::SchemaMismatch(_) => "SchemaMismatch",
            EngineError::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = EngineError::Validation("tokens out of range".to_string());
        assert_eq!(format!("{}", err), "Validation error: tokens out of range");
    }

    #[test]
    fn test_mutation_detected_is_fatal_class() {
        let err = EngineError::MutationDetected("interactions shrank".to_string());
        assert_eq!(err.class(), "MutationDetected");
        assert_eq!(err.http_code(), 500);
    }

    #[test]
    fn test_backpressure_maps_to_503() {
        let err = EngineError::BackPressure("queue full".to_string());
        assert_eq!(err.http_code(), 503);
    }

    #[test]
    fn test_invalid_transition_maps_to_409() {
        let err = EngineError::InvalidTransition("finalized -> open".to_string());
        assert_eq!(err.http_code(), 409);
    }
}
