//! Common test utilities for all integration tests.
//!
//! Provides a migrated SQLite database and a fully wired leasing engine backed
//! by the static provider and a manual clock.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod test_db;

use chrono::{Duration as ChronoDuration, Utc};
use leasekeeper::config::LeasingConfig;
use leasekeeper::domain::{
    Actor, AwsConfig, DynamicSecret, DynamicSecretConfig, EnvironmentId, MemberId,
    NewDynamicSecret, ProviderKind, RequestContext, Requester,
};
use leasekeeper::leasing::{
    CreateLeaseRequest, DynamicSecretService, ExpirySweeper, LeaseLifecycleManager, LeaseStores,
    ManualClock, TtlPolicy,
};
use leasekeeper::providers::{
    ProviderAuthentication, ProviderRegistry, StaticAuthenticationResolver,
    StaticCredentialProvider,
};
use leasekeeper::utils::RetryConfig;
use std::sync::Arc;
use std::time::Duration;

pub use test_db::TestDatabase;

pub const AUTH_REF: &str = "aws-test";

/// Leasing settings with fast retries for tests
pub fn test_leasing_config() -> LeasingConfig {
    LeasingConfig {
        provider_timeout_seconds: 1,
        provider_max_attempts: 3,
        provider_initial_backoff_ms: 1,
        provider_max_backoff_ms: 5,
        ..Default::default()
    }
}

pub struct TestEngine {
    pub db: TestDatabase,
    pub provider: Arc<StaticCredentialProvider>,
    pub clock: Arc<ManualClock>,
    pub manager: Arc<LeaseLifecycleManager>,
    pub secrets: DynamicSecretService,
    pub sweeper: ExpirySweeper,
}

impl TestEngine {
    pub async fn new(prefix: &str) -> Self {
        Self::with_provider(prefix, StaticCredentialProvider::new(ProviderKind::Aws), test_leasing_config())
            .await
    }

    pub async fn with_provider(
        prefix: &str,
        provider: StaticCredentialProvider,
        config: LeasingConfig,
    ) -> Self {
        let db = TestDatabase::new(prefix).await;
        let stores = LeaseStores::sqlx(db.pool.clone(), RetryConfig::default());
        Self::with_stores(db, stores, provider, config)
    }

    pub fn with_stores(
        db: TestDatabase,
        stores: LeaseStores,
        provider: StaticCredentialProvider,
        config: LeasingConfig,
    ) -> Self {
        let provider = Arc::new(provider);
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());

        let authentication = StaticAuthenticationResolver::new().with(
            AUTH_REF,
            ProviderAuthentication::from_iter([
                ("access_key_id", "AKIATESTKEY"),
                ("secret_access_key", "test-secret"),
            ]),
        );

        let secrets = DynamicSecretService::new(
            Arc::clone(&stores.secrets),
            TtlPolicy::new(config.minimum_lease_ttl_seconds),
        )
        .with_clock(clock.clone());

        let manager = Arc::new(
            LeaseLifecycleManager::new(stores, Arc::new(registry), Arc::new(authentication), &config)
                .with_clock(clock.clone()),
        );
        let sweeper = ExpirySweeper::new(Arc::clone(&manager), &config);

        Self { db, provider, clock, manager, secrets, sweeper }
    }

    /// Create a secret with default TTL 3600s and max TTL 7200s
    pub async fn create_secret(&self, name: &str) -> DynamicSecret {
        self.secrets
            .create(new_secret(EnvironmentId::from_string("env-test".into()), name))
            .await
            .expect("create dynamic secret")
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(ChronoDuration::seconds(seconds));
    }
}

pub fn new_secret(environment_id: EnvironmentId, name: &str) -> NewDynamicSecret {
    NewDynamicSecret {
        environment_id,
        name: name.to_string(),
        path: format!("aws/{}", name),
        config: DynamicSecretConfig::Aws(AwsConfig {
            role_arn: "arn:aws:iam::123456789012:role/deploy".to_string(),
            external_id: None,
            session_policy: None,
            role_session_name_template: None,
            region: Some("us-east-1".to_string()),
        }),
        default_ttl_seconds: 3600,
        max_ttl_seconds: 7200,
        authentication_ref: AUTH_REF.to_string(),
    }
}

pub fn member() -> Requester {
    Requester::Member(MemberId::from_string("member-1".into()))
}

pub fn member_context() -> RequestContext {
    RequestContext::new(Actor::from(member()))
        .with_client(Some("10.0.0.7".to_string()), Some("leasekeeper-tests/1.0".to_string()))
}

pub fn lease_request(secret: &DynamicSecret, ttl_seconds: Option<u64>) -> CreateLeaseRequest {
    let request = CreateLeaseRequest::new(secret.id.clone(), member());
    match ttl_seconds {
        Some(ttl) => request.with_ttl(ttl),
        None => request,
    }
}

pub const SHORT_WAIT: Duration = Duration::from_millis(50);
