//! # Error Handling
//!
//! Error types for the leasekeeper engine, defined with `thiserror`.

pub mod types;

pub use types::{LeaseError, ProviderFailure, Result};

/// Alias used by binaries and startup code
pub type Error = LeaseError;
