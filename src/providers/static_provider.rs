//! Deterministic credential provider for development and tests.
//!
//! Mints fake, well-formed credentials without any network access. Failures
//! can be scripted per call so lifecycle behaviour can be exercised end to end.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::error::ProviderError;
use super::provider::{CredentialProvider, CredentialSet, IssueRequest, RevokeRequest};
use crate::domain::{ProviderKind, SecretString};

#[derive(Debug)]
pub struct StaticCredentialProvider {
    kind: ProviderKind,
    supports_revocation: bool,
    delay: Option<Duration>,
    issue_failures: Mutex<VecDeque<ProviderError>>,
    revoke_failures: Mutex<VecDeque<ProviderError>>,
    issue_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
}

impl StaticCredentialProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            supports_revocation: false,
            delay: None,
            issue_failures: Mutex::new(VecDeque::new()),
            revoke_failures: Mutex::new(VecDeque::new()),
            issue_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
        }
    }

    /// Accept revocation requests instead of reporting them unsupported
    pub fn with_revocation(mut self) -> Self {
        self.supports_revocation = true;
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next issue call with `error`. Queued failures are consumed in order.
    pub fn fail_next_issue(&self, error: ProviderError) {
        if let Ok(mut queue) = self.issue_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Fail the next revoke call with `error`
    pub fn fail_next_revoke(&self, error: ProviderError) {
        if let Ok(mut queue) = self.revoke_failures.lock() {
            queue.push_back(error);
        }
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_failure(queue: &Mutex<VecDeque<ProviderError>>) -> Option<ProviderError> {
        queue.lock().ok().and_then(|mut queue| queue.pop_front())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn issue(&self, request: &IssueRequest<'_>) -> Result<CredentialSet, ProviderError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(error) = Self::next_failure(&self.issue_failures) {
            return Err(error);
        }

        let token = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        let mut fields = BTreeMap::new();
        fields.insert("access_key_id".to_string(), SecretString::new(format!("ASIA{}", &token[..16])));
        fields.insert(
            "secret_access_key".to_string(),
            SecretString::new(uuid::Uuid::new_v4().simple().to_string()),
        );
        fields.insert(
            "session_token".to_string(),
            SecretString::new(format!("static-session-{}", uuid::Uuid::new_v4().simple())),
        );

        tracing::debug!(
            lease_id = %request.lease_id,
            secret_id = %request.secret.id,
            ttl_seconds = request.ttl.as_secs(),
            "Issued static credentials"
        );

        Ok(CredentialSet::new(fields)
            .with_reference(format!("static:{}:{}", request.secret.name, request.lease_id.short())))
    }

    async fn revoke(&self, request: &RevokeRequest<'_>) -> Result<(), ProviderError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(error) = Self::next_failure(&self.revoke_failures) {
            return Err(error);
        }

        if !self.supports_revocation {
            return Err(ProviderError::Unsupported { provider: self.kind, operation: "revoke" });
        }

        tracing::debug!(
            lease_id = %request.lease_id,
            provider_reference = ?request.provider_reference,
            "Revoked static credentials"
        );
        Ok(())
    }
}
