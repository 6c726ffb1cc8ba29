//! # Lease Lifecycle Manager
//!
//! Orchestrates lease creation, renewal, revocation and expiry:
//!
//! ```text
//! CREATED -> ACTIVE -> RENEWED* -> EXPIRED | REVOKED
//! ```
//!
//! New leases are persisted directly as `ACTIVE` with a single `CREATED`
//! event. `EXPIRED` and `REVOKED` are terminal. Every transition is a guarded
//! compare-and-swap in the lease store that commits together with its event.
//!
//! This is the only place provider, storage and policy failures are folded
//! into the caller-facing [`LeaseError`] kinds.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::events::EventRecorder;
use super::guards::LeaseGuards;
use super::ttl::TtlPolicy;
use crate::config::LeasingConfig;
use crate::domain::{
    Actor, ClientMetadata, DynamicSecret, DynamicSecretId, IssuedLease, Lease, LeaseEvent,
    LeaseEventType, LeaseId, LeaseStatus, RequestContext, Requester,
};
use crate::errors::{LeaseError, Result};
use crate::observability::MetricsRecorder;
use crate::providers::{
    AuthenticationResolver, CredentialProvider, CredentialSet, IssueRequest, ProviderAuthentication,
    ProviderError, ProviderRegistry, RevokeRequest,
};
use crate::storage::{
    DbPool, DynamicSecretRepository, LeaseEventRepository, LeaseRepository, LeaseTransition,
    SqlxDynamicSecretRepository, SqlxLeaseEventRepository, SqlxLeaseRepository,
};
use crate::utils::{retry_with_backoff, RetryConfig};

const MAX_LEASE_NAME_LEN: usize = 255;

/// The three stores the manager reads and writes
#[derive(Clone)]
pub struct LeaseStores {
    pub secrets: Arc<dyn DynamicSecretRepository>,
    pub leases: Arc<dyn LeaseRepository>,
    pub events: Arc<dyn LeaseEventRepository>,
}

impl LeaseStores {
    /// SQLx-backed stores sharing one pool
    pub fn sqlx(pool: DbPool, retry: RetryConfig) -> Self {
        Self {
            secrets: Arc::new(SqlxDynamicSecretRepository::with_retry(pool.clone(), retry.clone())),
            leases: Arc::new(SqlxLeaseRepository::with_retry(pool.clone(), retry.clone())),
            events: Arc::new(SqlxLeaseEventRepository::with_retry(pool, retry)),
        }
    }
}

/// Input for [`LeaseLifecycleManager::create_lease`]
#[derive(Debug, Clone)]
pub struct CreateLeaseRequest {
    pub secret_id: DynamicSecretId,
    pub requester: Requester,
    /// Defaults to `<secret name>-<first 8 chars of the lease id>`
    pub name: Option<String>,
    /// Defaults to the secret's default TTL
    pub ttl_seconds: Option<u64>,
    pub client: ClientMetadata,
}

impl CreateLeaseRequest {
    pub fn new(secret_id: DynamicSecretId, requester: Requester) -> Self {
        Self { secret_id, requester, name: None, ttl_seconds: None, client: ClientMetadata::default() }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn context(&self) -> RequestContext {
        RequestContext { actor: Actor::from(self.requester.clone()), client: self.client.clone() }
    }
}

pub struct LeaseLifecycleManager {
    secrets: Arc<dyn DynamicSecretRepository>,
    leases: Arc<dyn LeaseRepository>,
    recorder: EventRecorder,
    providers: Arc<ProviderRegistry>,
    authentication: Arc<dyn AuthenticationResolver>,
    policy: TtlPolicy,
    provider_timeout: Duration,
    provider_retry: RetryConfig,
    guards: Arc<LeaseGuards>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRecorder,
}

impl LeaseLifecycleManager {
    pub fn new(
        stores: LeaseStores,
        providers: Arc<ProviderRegistry>,
        authentication: Arc<dyn AuthenticationResolver>,
        config: &LeasingConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            secrets: stores.secrets,
            leases: stores.leases,
            recorder: EventRecorder::new(stores.events, Arc::clone(&clock)),
            providers,
            authentication,
            policy: TtlPolicy::new(config.minimum_lease_ttl_seconds),
            provider_timeout: config.provider_timeout(),
            provider_retry: config.provider_retry(),
            guards: Arc::new(LeaseGuards::new()),
            clock,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.recorder = self.recorder.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.policy
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Issue credentials and persist a new `ACTIVE` lease.
    ///
    /// All-or-nothing: no lease or event exists unless issuance succeeded.
    /// The returned credentials are never retrievable again.
    #[instrument(skip(self, request), fields(secret_id = %request.secret_id), name = "create_lease")]
    pub async fn create_lease(&self, request: CreateLeaseRequest) -> Result<IssuedLease> {
        let result = self.create_lease_inner(request).await;
        self.observe("create", &result);
        result
    }

    async fn create_lease_inner(&self, request: CreateLeaseRequest) -> Result<IssuedLease> {
        let secret = self
            .secrets
            .get(&request.secret_id)
            .await?
            .ok_or_else(|| LeaseError::secret_not_found(request.secret_id.as_str()))?;

        let ttl = self.policy.validate(request.ttl_seconds, &secret)?;

        let lease_id = LeaseId::new();
        let name = lease_name(request.name.as_deref(), &secret, &lease_id)?;

        let to_creation_failure = |error: ProviderError| LeaseError::LeaseCreationFailed {
            reason: error.failure(),
            message: error.to_string(),
        };

        let provider = self.provider_for(&secret)?;
        let authentication = self.resolve_authentication(&secret).await.map_err(to_creation_failure)?;
        let issue = IssueRequest {
            lease_id: &lease_id,
            secret: &secret,
            authentication: &authentication,
            ttl: Duration::from_secs(ttl),
        };
        let credentials =
            self.issue_with_retry(provider.as_ref(), &issue).await.map_err(to_creation_failure)?;

        let now = self.clock.now();
        let lease = Lease {
            id: lease_id.clone(),
            name,
            secret_id: secret.id.clone(),
            requester: request.requester.clone(),
            ttl_seconds: ttl,
            status: LeaseStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl_duration(ttl),
            revoked_at: None,
            provider_reference: credentials.provider_reference.clone(),
            version: 1,
        };
        let event = self.recorder.build_at(
            &lease.id,
            LeaseEventType::Created,
            &request.context(),
            json!({ "ttl_seconds": ttl, "provider": secret.provider.as_str() }),
            now,
        );

        if let Err(error) = self.leases.insert_with_event(&lease, &event).await {
            warn!(
                lease_id = %lease.id,
                error = %error,
                "Failed to persist lease after issuance; revoking issued credentials"
            );
            self.revoke_orphaned(
                provider.as_ref(),
                &lease.id,
                lease.provider_reference.as_deref(),
                &secret,
                &authentication,
            )
            .await;
            return Err(error);
        }

        self.metrics.record_lease_created(secret.provider.as_str());
        info!(
            lease_id = %lease.id,
            secret_id = %secret.id,
            ttl_seconds = ttl,
            expires_at = %lease.expires_at,
            "Lease created"
        );

        Ok(IssuedLease { lease, credentials: Some(credentials.into_credentials(secret.provider)) })
    }

    // ------------------------------------------------------------------
    // Renew
    // ------------------------------------------------------------------

    /// Extend a live lease by `ttl_seconds` from now.
    ///
    /// The TTL is bounded per renewal by the secret's maximum; there is no
    /// cumulative cap. `expires_at` never moves backwards; when the current
    /// expiry is later, it is kept and the stored TTL is the time remaining.
    /// A lease found lapsed is expired and reported terminal.
    #[instrument(skip(self, context), fields(lease_id = %lease_id, ttl_seconds = ttl_seconds), name = "renew_lease")]
    pub async fn renew_lease(
        &self,
        lease_id: &LeaseId,
        ttl_seconds: u64,
        context: &RequestContext,
    ) -> Result<IssuedLease> {
        let result = self.renew_lease_inner(lease_id, ttl_seconds, context).await;
        self.observe("renew", &result);
        result
    }

    async fn renew_lease_inner(
        &self,
        lease_id: &LeaseId,
        ttl_seconds: u64,
        context: &RequestContext,
    ) -> Result<IssuedLease> {
        let _guard = self.guards.explicit(lease_id).await;

        let lease = self.load_lease(lease_id).await?;
        if lease.status.is_terminal() {
            return Err(LeaseError::lease_terminal(lease.id.as_str(), lease.status));
        }

        if lease.is_lapsed(self.clock.now()) {
            let status = match self.expire_locked(&lease, "renewal requested after expiry", false).await? {
                Some(expired) => expired.status,
                None => self.load_lease(lease_id).await?.status,
            };
            return Err(LeaseError::lease_terminal(lease.id.as_str(), status));
        }

        let secret = self
            .secrets
            .get(&lease.secret_id)
            .await?
            .ok_or_else(|| LeaseError::secret_not_found(lease.secret_id.as_str()))?;

        let ttl = self.policy.validate(Some(ttl_seconds), &secret)?;

        let to_renew_failure = |error: ProviderError| provider_failed("renew", error);
        let provider = self.provider_for(&secret)?;
        let authentication = self.resolve_authentication(&secret).await.map_err(to_renew_failure)?;
        let issue = IssueRequest {
            lease_id: &lease.id,
            secret: &secret,
            authentication: &authentication,
            ttl: Duration::from_secs(ttl),
        };
        let credentials =
            self.issue_with_retry(provider.as_ref(), &issue).await.map_err(to_renew_failure)?;

        let now = self.clock.now();
        let (effective_ttl, expires_at) = renewed_term(now, ttl, lease.expires_at);
        let transition = LeaseTransition::renew(
            &lease,
            effective_ttl,
            expires_at,
            credentials.provider_reference.clone(),
            now,
        );
        let event = self.recorder.build_at(
            &lease.id,
            LeaseEventType::Renewed,
            context,
            json!({
                "requested_ttl_seconds": ttl,
                "ttl_seconds": effective_ttl,
                "previous_expires_at": lease.expires_at,
                "expires_at": expires_at,
            }),
            now,
        );

        let Some(renewed) = self.leases.transition(&transition, &event).await? else {
            warn!(lease_id = %lease.id, "Renewal lost a concurrent update; revoking reissued credentials");
            self.revoke_orphaned(
                provider.as_ref(),
                &lease.id,
                credentials.provider_reference.as_deref(),
                &secret,
                &authentication,
            )
            .await;
            return Err(self.lost_race(&lease.id).await);
        };

        self.metrics.record_lease_renewed(secret.provider.as_str());
        info!(
            lease_id = %renewed.id,
            ttl_seconds = effective_ttl,
            expires_at = %renewed.expires_at,
            "Lease renewed"
        );

        Ok(IssuedLease {
            lease: renewed,
            credentials: Some(credentials.into_credentials(secret.provider)),
        })
    }

    // ------------------------------------------------------------------
    // Revoke
    // ------------------------------------------------------------------

    /// Revoke a lease. Idempotent: a terminal lease is returned unchanged.
    ///
    /// Providers that cannot revoke early still let the lease move to
    /// `REVOKED`; any other provider failure leaves the lease untouched.
    #[instrument(skip(self, context), fields(lease_id = %lease_id), name = "revoke_lease")]
    pub async fn revoke_lease(&self, lease_id: &LeaseId, context: &RequestContext) -> Result<Lease> {
        let result = self.revoke_lease_inner(lease_id, context).await;
        self.observe("revoke", &result);
        result
    }

    async fn revoke_lease_inner(&self, lease_id: &LeaseId, context: &RequestContext) -> Result<Lease> {
        let _guard = self.guards.explicit(lease_id).await;

        let lease = self.load_lease(lease_id).await?;
        if lease.status.is_terminal() {
            debug!(lease_id = %lease.id, status = %lease.status, "Lease already terminal; revoke is a no-op");
            return Ok(lease);
        }

        let provider_revoked = match self.revoke_with_provider(&lease).await {
            Ok(()) => true,
            Err(error) if error.is_unsupported() => {
                info!(lease_id = %lease.id, "Provider cannot revoke early; revoking lease locally");
                false
            }
            Err(error) => return Err(provider_failed("revoke", error)),
        };

        let now = self.clock.now();
        let transition = LeaseTransition::revoke(&lease, now);
        let event = self.recorder.build_at(
            &lease.id,
            LeaseEventType::Revoked,
            context,
            json!({ "provider_revoked": provider_revoked }),
            now,
        );

        match self.leases.transition(&transition, &event).await? {
            Some(revoked) => {
                self.metrics.record_lease_revoked();
                info!(lease_id = %revoked.id, provider_revoked, "Lease revoked");
                Ok(revoked)
            }
            None => {
                let current = self.load_lease(lease_id).await?;
                if current.status.is_terminal() {
                    Ok(current)
                } else {
                    Err(LeaseError::conflict("lease", lease_id.as_str()))
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Leases of a secret, newest first, including terminal ones.
    ///
    /// Lapsed leases are expired before being returned. Leases of a
    /// soft-deleted secret remain listable.
    #[instrument(skip(self), fields(secret_id = %secret_id), name = "list_leases")]
    pub async fn list_leases(&self, secret_id: &DynamicSecretId) -> Result<Vec<Lease>> {
        if self.secrets.get_including_deleted(secret_id).await?.is_none() {
            return Err(LeaseError::secret_not_found(secret_id.as_str()));
        }

        let leases = self.leases.list_by_secret(secret_id).await?;
        let now = self.clock.now();

        let mut result = Vec::with_capacity(leases.len());
        for lease in leases {
            if lease.is_lapsed(now) {
                result.push(self.expire_on_read(lease).await?);
            } else {
                result.push(lease);
            }
        }
        Ok(result)
    }

    /// A single lease, without credentials
    #[instrument(skip(self), fields(lease_id = %lease_id), name = "get_lease")]
    pub async fn get_lease(&self, lease_id: &LeaseId) -> Result<Lease> {
        let lease = self.load_lease(lease_id).await?;
        if lease.is_lapsed(self.clock.now()) {
            return self.expire_on_read(lease).await;
        }
        Ok(lease)
    }

    /// Audit trail of a lease in recorded order
    #[instrument(skip(self), fields(lease_id = %lease_id), name = "list_lease_events")]
    pub async fn list_lease_events(&self, lease_id: &LeaseId) -> Result<Vec<LeaseEvent>> {
        self.load_lease(lease_id).await?;
        self.recorder.history(lease_id).await
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// Expire up to `limit` lapsed leases. Returns how many were expired.
    ///
    /// Leases busy with an explicit operation are skipped and picked up by a
    /// later pass if still lapsed. Failures on one lease do not stop the pass.
    #[instrument(skip(self), name = "expire_lapsed")]
    pub async fn expire_lapsed(&self, limit: u32) -> Result<usize> {
        let lapsed = self.leases.list_lapsed(self.clock.now(), limit).await?;
        let mut expired = 0;

        for lease in lapsed {
            match self.try_expire(&lease.id).await {
                Ok(Some(_)) => expired += 1,
                Ok(None) => {}
                Err(error) => {
                    warn!(lease_id = %lease.id, error = %error, "Failed to expire lease");
                    self.metrics.record_operation_failure("expire", error.kind());
                }
            }
        }

        Ok(expired)
    }

    /// Expire one lease without waiting on other operations
    async fn try_expire(&self, lease_id: &LeaseId) -> Result<Option<Lease>> {
        let Some(_guard) = self.guards.try_passive(lease_id) else {
            debug!(lease_id = %lease_id, "Lease busy; skipping expiry");
            return Ok(None);
        };

        let Some(lease) = self.leases.get(lease_id).await? else {
            return Ok(None);
        };
        if !lease.is_lapsed(self.clock.now()) {
            return Ok(None);
        }

        self.expire_locked(&lease, "ttl elapsed", true).await
    }

    async fn expire_on_read(&self, lease: Lease) -> Result<Lease> {
        match self.try_expire(&lease.id).await? {
            Some(expired) => Ok(expired),
            None => Ok(lease),
        }
    }

    /// Best-effort provider revoke then transition to `EXPIRED`.
    ///
    /// The caller holds the lease guard. Passive callers give way if an
    /// explicit operation queued up during the provider call.
    async fn expire_locked(&self, lease: &Lease, reason: &str, passive: bool) -> Result<Option<Lease>> {
        if let Err(error) = self.revoke_with_provider(lease).await {
            if !error.is_unsupported() {
                debug!(lease_id = %lease.id, error = %error, "Provider revoke during expiry failed; ignoring");
            }
        }

        if passive && self.guards.explicit_pending(&lease.id) {
            debug!(lease_id = %lease.id, "Explicit operation pending; abandoning expiry");
            return Ok(None);
        }

        let now = self.clock.now();
        let transition = LeaseTransition::expire(lease, now);
        let event = self.recorder.build_at(
            &lease.id,
            LeaseEventType::Expired,
            &RequestContext::system(),
            json!({ "expires_at": lease.expires_at, "reason": reason }),
            now,
        );

        let expired = self.leases.transition(&transition, &event).await?;
        if let Some(expired) = &expired {
            self.metrics.record_lease_expired();
            info!(lease_id = %expired.id, expires_at = %expired.expires_at, reason, "Lease expired");
        }
        Ok(expired)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_lease(&self, lease_id: &LeaseId) -> Result<Lease> {
        self.leases.get(lease_id).await?.ok_or_else(|| LeaseError::lease_not_found(lease_id.as_str()))
    }

    async fn lost_race(&self, lease_id: &LeaseId) -> LeaseError {
        match self.load_lease(lease_id).await {
            Ok(current) if current.status.is_terminal() => {
                LeaseError::lease_terminal(current.id.as_str(), current.status)
            }
            Ok(_) => LeaseError::conflict("lease", lease_id.as_str()),
            Err(error) => error,
        }
    }

    fn provider_for(&self, secret: &DynamicSecret) -> Result<Arc<dyn CredentialProvider>> {
        self.providers.get(secret.provider).ok_or_else(|| {
            LeaseError::config(format!("No credential provider registered for {}", secret.provider))
        })
    }

    async fn resolve_authentication(
        &self,
        secret: &DynamicSecret,
    ) -> std::result::Result<ProviderAuthentication, ProviderError> {
        self.authentication.resolve(&secret.authentication_ref).await
    }

    async fn issue_with_retry(
        &self,
        provider: &dyn CredentialProvider,
        request: &IssueRequest<'_>,
    ) -> std::result::Result<CredentialSet, ProviderError> {
        retry_with_backoff(&self.provider_retry, "provider_issue", ProviderError::is_retryable, || async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.provider_timeout, provider.issue(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout { timeout: self.provider_timeout }),
            };
            self.record_provider_call(provider, "issue", &result, started);
            result
        })
        .await
    }

    async fn revoke_with_provider(&self, lease: &Lease) -> std::result::Result<(), ProviderError> {
        let secret = match self.secrets.get_including_deleted(&lease.secret_id).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                return Err(ProviderError::rejected(format!(
                    "dynamic secret '{}' no longer exists",
                    lease.secret_id
                )))
            }
            Err(error) => return Err(ProviderError::unavailable(error.to_string())),
        };
        let provider = self
            .providers
            .get(secret.provider)
            .ok_or_else(|| ProviderError::rejected(format!("no provider registered for {}", secret.provider)))?;
        let authentication = self.resolve_authentication(&secret).await?;

        let request = RevokeRequest {
            lease_id: &lease.id,
            secret: &secret,
            authentication: &authentication,
            provider_reference: lease.provider_reference.as_deref(),
        };
        let provider = provider.as_ref();
        let request = &request;

        retry_with_backoff(&self.provider_retry, "provider_revoke", ProviderError::is_retryable, || async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.provider_timeout, provider.revoke(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout { timeout: self.provider_timeout }),
            };
            self.record_provider_call(provider, "revoke", &result, started);
            result
        })
        .await
    }

    /// Undo an issuance whose result could not be stored
    async fn revoke_orphaned(
        &self,
        provider: &dyn CredentialProvider,
        lease_id: &LeaseId,
        provider_reference: Option<&str>,
        secret: &DynamicSecret,
        authentication: &ProviderAuthentication,
    ) {
        let request = RevokeRequest { lease_id, secret, authentication, provider_reference };
        let started = Instant::now();
        let result = match tokio::time::timeout(self.provider_timeout, provider.revoke(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { timeout: self.provider_timeout }),
        };
        self.record_provider_call(provider, "revoke", &result, started);

        match result {
            Ok(()) => debug!(lease_id = %lease_id, "Revoked unrecorded credentials"),
            Err(error) if error.is_unsupported() => {
                warn!(lease_id = %lease_id, "Provider cannot revoke early; unrecorded credentials remain valid until they expire")
            }
            Err(error) => warn!(lease_id = %lease_id, error = %error, "Failed to revoke unrecorded credentials"),
        }
    }

    fn record_provider_call<T>(
        &self,
        provider: &dyn CredentialProvider,
        operation: &str,
        result: &std::result::Result<T, ProviderError>,
        started: Instant,
    ) {
        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.record_provider_call(provider.kind().as_str(), operation, result.is_ok(), elapsed);
        if let Err(ProviderError::RateLimited { retry_after: Some(after), .. }) = result {
            debug!(operation, retry_after_ms = after.as_millis() as u64, "Provider asked to back off");
        }
    }

    fn observe<T>(&self, operation: &str, result: &Result<T>) {
        if let Err(error) = result {
            self.metrics.record_operation_failure(operation, error.kind());
            debug!(operation, kind = error.kind(), error = %error, "Lease operation failed");
        }
    }
}

fn provider_failed(operation: &'static str, error: ProviderError) -> LeaseError {
    LeaseError::ProviderFailed { operation, reason: error.failure(), message: error.to_string() }
}

fn ttl_duration(ttl_seconds: u64) -> ChronoDuration {
    ChronoDuration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
}

fn lease_name(requested: Option<&str>, secret: &DynamicSecret, lease_id: &LeaseId) -> Result<String> {
    match requested.map(str::trim) {
        None => Ok(format!("{}-{}", secret.name, lease_id.short())),
        Some("") => Err(LeaseError::validation_field("Lease name cannot be empty", "name")),
        Some(name) if name.len() > MAX_LEASE_NAME_LEN => Err(LeaseError::validation_field(
            format!("Lease name cannot exceed {} characters", MAX_LEASE_NAME_LEN),
            "name",
        )),
        Some(name) => Ok(name.to_string()),
    }
}

/// TTL and expiry of a lease renewed at `now`.
///
/// Expiry never moves earlier than `current`. When it would, the lease keeps
/// its expiry and the stored TTL becomes the whole seconds remaining (rounded
/// up), so `expires_at == now + ttl` holds for the stored lease.
fn renewed_term(now: DateTime<Utc>, ttl_seconds: u64, current: DateTime<Utc>) -> (u64, DateTime<Utc>) {
    let requested = now + ttl_duration(ttl_seconds);
    if requested >= current {
        return (ttl_seconds, requested);
    }

    let mut remaining = (current - now).num_seconds();
    if now + ChronoDuration::seconds(remaining) < current {
        remaining += 1;
    }
    let remaining = u64::try_from(remaining).unwrap_or(ttl_seconds);
    (remaining, now + ttl_duration(remaining))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::domain::{AwsConfig, DynamicSecretConfig, EnvironmentId, MemberId, ProviderKind};
    use crate::providers::{StaticAuthenticationResolver, StaticCredentialProvider};
    use crate::storage::create_pool;
    use tracing_test::traced_test;

    fn secret() -> DynamicSecret {
        let now = Utc::now();
        DynamicSecret {
            id: DynamicSecretId::new(),
            environment_id: EnvironmentId::new(),
            name: "deploy-role".into(),
            path: "aws/deploy".into(),
            provider: ProviderKind::Aws,
            config: DynamicSecretConfig::Aws(AwsConfig {
                role_arn: "arn:aws:iam::123456789012:role/deploy".into(),
                external_id: None,
                session_policy: None,
                role_session_name_template: None,
                region: None,
            }),
            default_ttl_seconds: 3600,
            max_ttl_seconds: 7200,
            authentication_ref: "aws-prod".into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_default_lease_name_uses_short_id() {
        let secret = secret();
        let id = LeaseId::new();
        let name = lease_name(None, &secret, &id).unwrap();
        assert_eq!(name, format!("deploy-role-{}", id.short()));
    }

    #[test]
    fn test_lease_name_rejects_blank() {
        let err = lease_name(Some("   "), &secret(), &LeaseId::new()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_renewed_term_never_moves_expiry_backwards() {
        let now = Utc::now();
        let far = now + ChronoDuration::hours(2);
        assert_eq!(renewed_term(now, 600, far), (7200, far));
        assert_eq!(renewed_term(now, 600, now), (600, now + ChronoDuration::seconds(600)));
    }

    #[test]
    fn test_renewed_term_rounds_partial_seconds_up() {
        let now = Utc::now();
        let current = now + ChronoDuration::milliseconds(7_140_250);

        let (ttl, expires_at) = renewed_term(now, 600, current);

        assert_eq!(ttl, 7141);
        assert!(expires_at >= current);
        assert_eq!(expires_at, now + ChronoDuration::seconds(ttl as i64));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_credentials_never_reach_logs() {
        let pool = create_pool(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        let stores = LeaseStores::sqlx(pool, RetryConfig::default());
        let secret = secret();
        stores.secrets.create(&secret).await.unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StaticCredentialProvider::new(ProviderKind::Aws).with_revocation()));
        let authentication = StaticAuthenticationResolver::new().with(
            "aws-prod",
            ProviderAuthentication::from_iter([("secret_access_key", "auth-material-7781")]),
        );
        let manager = LeaseLifecycleManager::new(
            stores,
            Arc::new(registry),
            Arc::new(authentication),
            &LeasingConfig::default(),
        );

        let requester = Requester::Member(MemberId::from_string("m-1".into()));
        let issued = manager
            .create_lease(CreateLeaseRequest::new(secret.id.clone(), requester).with_ttl(900))
            .await
            .unwrap();
        let credentials = issued.credentials.clone().unwrap();
        tracing::info!(lease = ?issued, "issued lease");
        manager.revoke_lease(&issued.lease.id, &RequestContext::system()).await.unwrap();

        assert!(logs_contain("Lease created"));
        assert!(logs_contain("Lease revoked"));
        for value in credentials.reveal().values() {
            assert!(!logs_contain(value), "credential value leaked into logs");
        }
        assert!(!logs_contain("auth-material-7781"));
    }
}
