//! Credential provider registry
//!
//! Maps each [`ProviderKind`] to the implementation that serves it. Adding a
//! provider means registering a new implementation; the lifecycle manager only
//! ever dispatches through this registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::provider::CredentialProvider;
use super::static_provider::StaticCredentialProvider;
use crate::config::ProviderConfig;
use crate::domain::ProviderKind;
use crate::errors::Result;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn CredentialProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any existing one for the same kind
    pub fn register(&mut self, provider: Arc<dyn CredentialProvider>) {
        let kind = provider.kind();
        info!(provider = %kind, "Registering credential provider");
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn CredentialProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn registered_providers(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }

    /// Build the registry from configuration.
    ///
    /// With `use_mock_provider` set, every kind is served by the static
    /// provider. Otherwise real providers are registered for the enabled
    /// cargo features.
    pub async fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut registry = Self::new();

        if config.use_mock_provider {
            registry.register(Arc::new(StaticCredentialProvider::new(ProviderKind::Aws)));
            info!("Registered static credential provider (LEASEKEEPER_USE_MOCK_PROVIDER=1)");
            return Ok(registry);
        }

        #[cfg(feature = "aws")]
        {
            let aws = super::aws::AwsStsProvider::from_config(config).await;
            registry.register(Arc::new(aws));
        }

        if registry.providers.is_empty() {
            warn!("No credential providers registered; lease creation will fail until one is configured");
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.get(ProviderKind::Aws).is_none());

        registry.register(Arc::new(StaticCredentialProvider::new(ProviderKind::Aws)));
        assert!(registry.has_provider(ProviderKind::Aws));
        assert_eq!(registry.registered_providers(), vec![ProviderKind::Aws]);
        assert!(format!("{:?}", registry).contains("Aws"));
    }

    #[tokio::test]
    async fn test_from_config_with_mock_provider() {
        let config = ProviderConfig { use_mock_provider: true, ..Default::default() };
        let registry = ProviderRegistry::from_config(&config).await.unwrap();
        assert!(registry.has_provider(ProviderKind::Aws));
    }
}
