//! TTL policy evaluation.
//!
//! Pure validation of a requested lease TTL against the engine-wide floor and
//! the owning secret's bounds. No side effects.

use crate::domain::DynamicSecret;
use crate::errors::{LeaseError, Result};

/// Engine-wide TTL floor. A requested TTL must be strictly greater.
pub const MINIMUM_LEASE_TTL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    minimum_ttl_seconds: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(MINIMUM_LEASE_TTL_SECONDS)
    }
}

impl TtlPolicy {
    pub fn new(minimum_ttl_seconds: u64) -> Self {
        Self { minimum_ttl_seconds }
    }

    pub fn minimum_ttl_seconds(&self) -> u64 {
        self.minimum_ttl_seconds
    }

    /// Resolve and check the TTL for a create or renew request.
    ///
    /// A missing request falls back to the secret's default TTL, which is
    /// checked the same way.
    pub fn validate(&self, requested: Option<u64>, secret: &DynamicSecret) -> Result<u64> {
        let ttl = requested.unwrap_or(secret.default_ttl_seconds);

        if ttl <= self.minimum_ttl_seconds {
            return Err(LeaseError::TtlTooShort { requested: ttl, minimum: self.minimum_ttl_seconds });
        }
        if ttl > secret.max_ttl_seconds {
            return Err(LeaseError::TtlExceedsMaximum {
                requested: ttl,
                maximum: secret.max_ttl_seconds,
            });
        }
        Ok(ttl)
    }
}
