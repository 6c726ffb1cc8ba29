//! # Error Types
//!
//! Caller-facing error taxonomy for the leasing engine using `thiserror`.
//!
//! Lower layers (providers, storage) fail with their own specific errors; the
//! lifecycle manager folds them into the small, stable set of kinds below.
//! No variant ever carries credential material.

use std::fmt;

/// Custom result type for leasing operations
pub type Result<T> = std::result::Result<T, LeaseError>;

/// Provider failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    /// Authentication material was rejected by the provider
    Auth,
    /// Provider throttled the request (retried before surfacing)
    RateLimited,
    /// Provider unreachable or timed out (retried before surfacing)
    Unavailable,
    /// Provider refused the request (e.g. invalid role ARN)
    Rejected,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailure::Auth => write!(f, "provider_auth_error"),
            ProviderFailure::RateLimited => write!(f, "provider_rate_limited"),
            ProviderFailure::Unavailable => write!(f, "provider_unavailable"),
            ProviderFailure::Rejected => write!(f, "provider_rejected"),
        }
    }
}

/// Main error type for the leasing engine
#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    /// Requested TTL is at or below the minimum lease TTL
    #[error("TTL of {requested}s is too short: must be greater than {minimum}s")]
    TtlTooShort { requested: u64, minimum: u64 },

    /// Requested TTL is above the secret's maximum
    #[error("TTL of {requested}s exceeds the maximum of {maximum}s")]
    TtlExceedsMaximum { requested: u64, maximum: u64 },

    /// Dynamic secret does not exist or is soft-deleted
    #[error("Dynamic secret not found: {id}")]
    SecretNotFound { id: String },

    /// Lease does not exist
    #[error("Lease not found: {id}")]
    LeaseNotFound { id: String },

    /// Lease is expired or revoked and can no longer change
    #[error("Lease '{id}' is {status} and cannot be modified")]
    LeaseTerminal { id: String, status: String },

    /// Issuance failed at the provider; no lease was created
    #[error("Lease creation failed ({reason}): {message}")]
    LeaseCreationFailed { reason: ProviderFailure, message: String },

    /// Provider call failed during renewal or revocation; lease left unchanged
    #[error("Provider {operation} failed ({reason}): {message}")]
    ProviderFailed {
        operation: &'static str,
        reason: ProviderFailure,
        message: String,
    },

    /// Storage could not be reached after retries
    #[error("Storage unavailable: {context}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Non-transient database errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Concurrent modification lost a compare-and-swap
    #[error("Concurrent modification of {resource_type} '{id}'")]
    Conflict { resource_type: String, id: String },

    /// Input validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LeaseError {
    /// Create a secret-not-found error
    pub fn secret_not_found<S: Into<String>>(id: S) -> Self {
        Self::SecretNotFound { id: id.into() }
    }

    /// Create a lease-not-found error
    pub fn lease_not_found<S: Into<String>>(id: S) -> Self {
        Self::LeaseNotFound { id: id.into() }
    }

    /// Create a terminal-lease error
    pub fn lease_terminal<S: Into<String>, T: fmt::Display>(id: S, status: T) -> Self {
        Self::LeaseTerminal { id: id.into(), status: status.to_string() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a conflict error
    pub fn conflict<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::Conflict { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classify a sqlx error as transient (`StorageUnavailable`) or permanent (`Database`)
    pub fn storage<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        if crate::storage::is_transient(&source) {
            Self::StorageUnavailable { context: context.into(), source: Some(source) }
        } else {
            Self::Database { source, context: context.into() }
        }
    }

    /// Stable machine-readable kind for the API layer
    pub fn kind(&self) -> &'static str {
        match self {
            LeaseError::TtlTooShort { .. } => "ttl_too_short",
            LeaseError::TtlExceedsMaximum { .. } => "ttl_exceeds_maximum",
            LeaseError::SecretNotFound { .. } => "secret_not_found",
            LeaseError::LeaseNotFound { .. } => "lease_not_found",
            LeaseError::LeaseTerminal { .. } => "lease_terminal",
            LeaseError::LeaseCreationFailed { .. } => "lease_creation_failed",
            LeaseError::ProviderFailed { reason, .. } => match reason {
                ProviderFailure::Auth => "provider_auth_error",
                ProviderFailure::RateLimited => "provider_rate_limited",
                ProviderFailure::Unavailable => "provider_unavailable",
                ProviderFailure::Rejected => "provider_rejected",
            },
            LeaseError::StorageUnavailable { .. } => "storage_unavailable",
            LeaseError::Database { .. } => "database_error",
            LeaseError::Conflict { .. } => "conflict",
            LeaseError::Validation { .. } => "validation_error",
            LeaseError::Config { .. } => "configuration_error",
            LeaseError::Serialization { .. } => "serialization_error",
            LeaseError::Internal { .. } => "internal_error",
        }
    }

    /// Whether a caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            LeaseError::StorageUnavailable { .. } => true,
            LeaseError::Conflict { .. } => true,
            LeaseError::LeaseCreationFailed { reason, .. }
            | LeaseError::ProviderFailed { reason, .. } => {
                matches!(reason, ProviderFailure::RateLimited | ProviderFailure::Unavailable)
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LeaseError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for LeaseError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for LeaseError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
