//! Credential provider trait and request/response types.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::auth::ProviderAuthentication;
use super::error::ProviderError;
use crate::domain::{DynamicSecret, LeaseCredentials, LeaseId, ProviderKind, SecretString};

/// Everything a provider needs to mint credentials for one lease
#[derive(Debug, Clone, Copy)]
pub struct IssueRequest<'a> {
    pub lease_id: &'a LeaseId,
    pub secret: &'a DynamicSecret,
    pub authentication: &'a ProviderAuthentication,
    pub ttl: Duration,
}

/// Identifies previously issued credentials for early revocation
#[derive(Debug, Clone, Copy)]
pub struct RevokeRequest<'a> {
    pub lease_id: &'a LeaseId,
    pub secret: &'a DynamicSecret,
    pub authentication: &'a ProviderAuthentication,
    pub provider_reference: Option<&'a str>,
}

/// Credentials minted by a provider.
///
/// `fields` are returned to the caller exactly once and never persisted.
/// `provider_reference` is stored with the lease for later revocation.
#[derive(Clone)]
pub struct CredentialSet {
    pub fields: BTreeMap<String, SecretString>,
    pub provider_reference: Option<String>,
}

impl CredentialSet {
    pub fn new(fields: BTreeMap<String, SecretString>) -> Self {
        Self { fields, provider_reference: None }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }

    pub fn into_credentials(self, provider: ProviderKind) -> LeaseCredentials {
        LeaseCredentials::new(provider, self.fields)
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("provider_reference", &self.provider_reference)
            .finish()
    }
}

/// A provider capable of issuing short-lived credentials.
///
/// One implementation is registered per [`ProviderKind`]. Implementations are
/// stateless per call and must never log credential material.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// The provider kind this implementation serves
    fn kind(&self) -> ProviderKind;

    /// Mint credentials valid for `request.ttl`
    async fn issue(&self, request: &IssueRequest<'_>) -> Result<CredentialSet, ProviderError>;

    /// Revoke previously issued credentials.
    ///
    /// Providers that cannot revoke early return [`ProviderError::Unsupported`].
    async fn revoke(&self, request: &RevokeRequest<'_>) -> Result<(), ProviderError>;
}
