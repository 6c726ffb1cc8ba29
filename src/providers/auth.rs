//! Resolution of provider authentication material.
//!
//! A dynamic secret stores only an `authentication_ref`; the material itself
//! is looked up at call time and never persisted by the leasing engine.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;

use super::error::ProviderError;
use crate::domain::SecretString;

/// Key/value credential material used to call a provider
#[derive(Clone, Default, PartialEq)]
pub struct ProviderAuthentication {
    fields: BTreeMap<String, SecretString>,
}

impl ProviderAuthentication {
    pub fn new(fields: BTreeMap<String, SecretString>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.fields.get(key)
    }

    /// Fetch a required field, failing with an authentication error when absent
    pub fn require(&self, key: &str) -> Result<&SecretString, ProviderError> {
        self.fields
            .get(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ProviderError::auth(format!("authentication field '{}' is missing", key)))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for ProviderAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAuthentication")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: Into<String>, V: Into<SecretString>> FromIterator<(K, V)> for ProviderAuthentication {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[async_trait]
pub trait AuthenticationResolver: Send + Sync + fmt::Debug {
    /// Resolve the material named by a dynamic secret's `authentication_ref`
    async fn resolve(&self, reference: &str) -> Result<ProviderAuthentication, ProviderError>;
}

/// Reads authentication material from environment variables.
///
/// Fields for reference `aws-main` are read from
/// `<PREFIX>__AWS_MAIN__<FIELD>`, e.g. `LEASEKEEPER_AUTH__AWS_MAIN__ACCESS_KEY_ID`,
/// and exposed under the lower-cased field name (`access_key_id`).
#[derive(Debug, Clone)]
pub struct EnvAuthenticationResolver {
    prefix: String,
}

impl EnvAuthenticationResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn reference_prefix(&self, reference: &str) -> String {
        let normalized: String = reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}__{}__", self.prefix, normalized)
    }

    fn collect<I: IntoIterator<Item = (String, String)>>(
        &self,
        reference: &str,
        vars: I,
    ) -> ProviderAuthentication {
        let prefix = self.reference_prefix(reference);
        vars.into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .filter(|field| !field.is_empty())
                    .map(|field| (field.to_lowercase(), SecretString::new(value)))
            })
            .collect()
    }
}

#[async_trait]
impl AuthenticationResolver for EnvAuthenticationResolver {
    async fn resolve(&self, reference: &str) -> Result<ProviderAuthentication, ProviderError> {
        let authentication = self.collect(reference, env::vars());
        if authentication.is_empty() {
            return Err(ProviderError::auth(format!(
                "no authentication material found for reference '{}' (expected {}<FIELD>)",
                reference,
                self.reference_prefix(reference)
            )));
        }
        Ok(authentication)
    }
}

/// In-memory resolver for development and tests
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticationResolver {
    entries: HashMap<String, ProviderAuthentication>,
}

impl StaticAuthenticationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, authentication: ProviderAuthentication) -> Self {
        self.entries.insert(reference.into(), authentication);
        self
    }
}

#[async_trait]
impl AuthenticationResolver for StaticAuthenticationResolver {
    async fn resolve(&self, reference: &str) -> Result<ProviderAuthentication, ProviderError> {
        self.entries.get(reference).cloned().ok_or_else(|| {
            ProviderError::auth(format!("unknown authentication reference '{}'", reference))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_prefix_normalizes() {
        let resolver = EnvAuthenticationResolver::new("LEASEKEEPER_AUTH");
        assert_eq!(resolver.reference_prefix("aws-main"), "LEASEKEEPER_AUTH__AWS_MAIN__");
    }

    #[test]
    fn test_collect_only_matching_reference() {
        let resolver = EnvAuthenticationResolver::new("LEASEKEEPER_AUTH");
        let vars = vec![
            ("LEASEKEEPER_AUTH__AWS_MAIN__ACCESS_KEY_ID".to_string(), "AKIA1".to_string()),
            ("LEASEKEEPER_AUTH__AWS_MAIN__SECRET_ACCESS_KEY".to_string(), "s3cr3t".to_string()),
            ("LEASEKEEPER_AUTH__AWS_MAIN_OTHER__ACCESS_KEY_ID".to_string(), "AKIA2".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];

        let auth = resolver.collect("aws-main", vars);
        assert_eq!(auth.get("access_key_id").map(|v| v.expose_secret()), Some("AKIA1"));
        assert!(auth.require("secret_access_key").is_ok());
        assert!(auth.get("other__access_key_id").is_none());
        assert!(matches!(auth.require("session_token"), Err(ProviderError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_env_resolver_missing_reference() {
        let resolver = EnvAuthenticationResolver::new("LEASEKEEPER_AUTH_TEST_UNSET");
        let err = resolver.resolve("nothing-here").await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticAuthenticationResolver::new()
            .with("aws-main", [("access_key_id", "AKIA1")].into_iter().collect());
        assert!(resolver.resolve("aws-main").await.is_ok());
        assert!(resolver.resolve("aws-other").await.is_err());
    }

    #[test]
    fn test_debug_hides_values() {
        let auth: ProviderAuthentication = [("secret_access_key", "hunter2")].into_iter().collect();
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }
}
