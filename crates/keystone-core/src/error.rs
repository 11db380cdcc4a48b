//! Error taxonomy shared by every Keystone crate.
//!
//! Variants carry string context rather than source errors so the type stays
//! `Clone`: a failed shared backend construction hands the same error to every
//! caller that was waiting on it.

use thiserror::Error;

/// Top-level error type for the Keystone platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeystoneError {
    #[error("Not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Spec validation error: {0}")]
    SpecValidation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KeystoneError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "node",
            id: id.into(),
        }
    }

    pub fn edge_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "edge",
            id: id.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(err.to_string())
    }

    /// Only transient backend failures are safe to retry. Keystone never
    /// retries on its own; callers decide.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for KeystoneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for KeystoneError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KeystoneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(KeystoneError::storage("connection reset").is_retryable());
        assert!(!KeystoneError::node_not_found("n-1").is_retryable());
        assert!(!KeystoneError::Unauthorized("org mismatch".into()).is_retryable());
    }

    #[test]
    fn not_found_message_names_the_id() {
        let err = KeystoneError::edge_not_found("a->b:owns");
        assert_eq!(err.to_string(), "Not found: edge a->b:owns");
        assert!(err.is_not_found());
    }
}
