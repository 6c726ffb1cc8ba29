//! # Credential Providers
//!
//! Pluggable issuers of short-lived credentials. Each [`ProviderKind`] is
//! served by one [`CredentialProvider`] registered in the [`ProviderRegistry`].
//!
//! ## Supported Providers
//!
//! - **AWS STS**: `AssumeRole` temporary credentials (feature `aws`)
//! - **Static**: deterministic fake credentials for development and tests
//!
//! [`ProviderKind`]: crate::domain::ProviderKind

pub mod auth;
#[cfg(feature = "aws")]
pub mod aws;
pub mod error;
pub mod provider;
pub mod registry;
pub mod static_provider;

pub use auth::{
    AuthenticationResolver, EnvAuthenticationResolver, ProviderAuthentication,
    StaticAuthenticationResolver,
};
#[cfg(feature = "aws")]
pub use aws::AwsStsProvider;
pub use error::ProviderError;
pub use provider::{CredentialProvider, CredentialSet, IssueRequest, RevokeRequest};
pub use registry::ProviderRegistry;
pub use static_provider::StaticCredentialProvider;
