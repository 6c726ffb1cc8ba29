//! Engine assembly.
//!
//! Wires the storage pool, provider registry, authentication resolver,
//! lifecycle manager, secret administration and sweeper from an [`AppConfig`].

use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::leasing::{
    DynamicSecretService, ExpirySweeper, LeaseLifecycleManager, LeaseStores, TtlPolicy,
};
use crate::providers::{AuthenticationResolver, EnvAuthenticationResolver, ProviderRegistry};
use crate::storage::{check_connection, create_pool, DbPool};

/// The assembled leasing engine
pub struct Engine {
    pub pool: DbPool,
    pub manager: Arc<LeaseLifecycleManager>,
    pub secrets: Arc<DynamicSecretService>,
    pub sweeper: ExpirySweeper,
}

impl Engine {
    /// Build every component from configuration
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let pool = create_pool(&config.database).await?;
        check_connection(&pool).await?;
        let providers = Arc::new(ProviderRegistry::from_config(&config.providers).await?);
        let authentication: Arc<dyn AuthenticationResolver> =
            Arc::new(EnvAuthenticationResolver::new(config.providers.auth_env_prefix.clone()));

        Ok(Self::assemble(pool, providers, authentication, config))
    }

    /// Build on top of an existing pool and provider set
    pub fn assemble(
        pool: DbPool,
        providers: Arc<ProviderRegistry>,
        authentication: Arc<dyn AuthenticationResolver>,
        config: &AppConfig,
    ) -> Self {
        let stores = LeaseStores::sqlx(pool.clone(), config.leasing.storage_retry());
        let secrets = Arc::new(DynamicSecretService::new(
            Arc::clone(&stores.secrets),
            TtlPolicy::new(config.leasing.minimum_lease_ttl_seconds),
        ));

        info!(providers = ?providers.registered_providers(), "Assembling leasing engine");

        let manager =
            Arc::new(LeaseLifecycleManager::new(stores, providers, authentication, &config.leasing));
        let sweeper = ExpirySweeper::new(Arc::clone(&manager), &config.leasing);

        Self { pool, manager, secrets, sweeper }
    }
}
