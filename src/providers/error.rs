//! Errors raised by credential providers.
//!
//! These stay inside the provider layer; the lifecycle manager maps them onto
//! the caller-facing [`crate::errors::LeaseError`] taxonomy.

use std::time::Duration;
use thiserror::Error;

use crate::domain::ProviderKind;
use crate::errors::ProviderFailure;

/// Error codes that indicate throttling across cloud APIs
const THROTTLING_CODES: &[&str] =
    &["Throttling", "ThrottlingException", "RequestLimitExceeded", "TooManyRequestsException"];

/// Error codes that indicate bad or expired caller credentials
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider authentication failed: {message}")]
    Auth { message: String },

    #[error("Provider rate limited the request: {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },

    #[error("Provider rejected the request: {message}")]
    Rejected { message: String },

    #[error("{operation} is not supported by the {provider} provider")]
    Unsupported { provider: ProviderKind, operation: &'static str },

    #[error("Provider call timed out after {}s", timeout.as_secs())]
    Timeout { timeout: Duration },
}

impl ProviderError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited { message: message.into(), retry_after: None }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected { message: message.into() }
    }

    /// Throttling, outages and timeouts may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Timeout { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Caller-facing failure reason. Timeouts surface as unavailability.
    pub fn failure(&self) -> ProviderFailure {
        match self {
            Self::Auth { .. } => ProviderFailure::Auth,
            Self::RateLimited { .. } => ProviderFailure::RateLimited,
            Self::Unavailable { .. } | Self::Timeout { .. } => ProviderFailure::Unavailable,
            Self::Rejected { .. } | Self::Unsupported { .. } => ProviderFailure::Rejected,
        }
    }

    /// Classify a cloud API failure from its error code and HTTP status.
    ///
    /// Codes take precedence; the status decides when the code is unknown.
    pub fn classify(code: Option<&str>, status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();

        if let Some(code) = code {
            if THROTTLING_CODES.contains(&code) {
                return Self::rate_limited(message);
            }
            if AUTH_CODES.contains(&code) {
                return Self::auth(message);
            }
        }

        match status {
            Some(429) => Self::rate_limited(message),
            Some(401) | Some(403) => Self::auth(message),
            Some(s) if s >= 500 => Self::unavailable(message),
            Some(_) => Self::rejected(message),
            None if code.is_some() => Self::rejected(message),
            None => Self::unavailable(message),
        }
    }
}
