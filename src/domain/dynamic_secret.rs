//! Dynamic secret definitions.
//!
//! A dynamic secret is a reusable recipe for producing leased credentials: it
//! names the provider, carries the provider-specific configuration and bounds
//! the TTL any lease against it may request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::id::{DynamicSecretId, EnvironmentId};
use crate::errors::{LeaseError, Result};

/// Supported credential providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    /// AWS STS AssumeRole
    Aws,
}

impl ProviderKind {
    /// Get the database representation of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AWS" => Ok(Self::Aws),
            _ => Err(format!("Unknown provider kind: {}", s)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// AWS role assumption settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Role assumed for every lease, e.g. `arn:aws:iam::123456789012:role/deploy`
    pub role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Inline session policy further restricting the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_policy: Option<serde_json::Value>,
    /// Supports `{{lease_id}}` and `{{secret_name}}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_session_name_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl AwsConfig {
    fn validate(&self) -> Result<()> {
        let arn = self.role_arn.trim();
        if !arn.starts_with("arn:aws") || !arn.contains(":role/") {
            return Err(LeaseError::validation_field(
                format!("'{}' is not an IAM role ARN", self.role_arn),
                "config.role_arn",
            ));
        }
        if let Some(policy) = &self.session_policy {
            if !policy.is_object() {
                return Err(LeaseError::validation_field(
                    "session policy must be a JSON object",
                    "config.session_policy",
                ));
            }
        }
        Ok(())
    }
}

/// Provider-specific configuration, tagged by provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DynamicSecretConfig {
    Aws(AwsConfig),
}

impl DynamicSecretConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Aws(_) => ProviderKind::Aws,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Aws(aws) => aws.validate(),
        }
    }
}

/// A configured dynamic secret
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSecret {
    pub id: DynamicSecretId,
    pub environment_id: EnvironmentId,
    pub name: String,
    pub path: String,
    pub provider: ProviderKind,
    pub config: DynamicSecretConfig,
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    /// Reference to the credential set used to call the provider
    pub authentication_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DynamicSecret {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Request to create a dynamic secret
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewDynamicSecret {
    pub environment_id: EnvironmentId,
    #[validate(length(min = 1, max = 128, message = "Name must be 1-128 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "Path cannot be empty"))]
    pub path: String,
    pub config: DynamicSecretConfig,
    #[validate(range(min = 1, message = "Default TTL must be positive"))]
    pub default_ttl_seconds: u64,
    #[validate(range(min = 1, message = "Max TTL must be positive"))]
    pub max_ttl_seconds: u64,
    #[validate(length(min = 1, message = "Authentication reference cannot be empty"))]
    pub authentication_ref: String,
}

/// Partial update to a dynamic secret; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDynamicSecret {
    pub name: Option<String>,
    pub path: Option<String>,
    pub config: Option<DynamicSecretConfig>,
    pub default_ttl_seconds: Option<u64>,
    pub max_ttl_seconds: Option<u64>,
    pub authentication_ref: Option<String>,
}

impl UpdateDynamicSecret {
    /// Apply the update on top of an existing secret
    pub fn apply_to(self, secret: &mut DynamicSecret) {
        if let Some(name) = self.name {
            secret.name = name;
        }
        if let Some(path) = self.path {
            secret.path = path;
        }
        if let Some(config) = self.config {
            secret.provider = config.kind();
            secret.config = config;
        }
        if let Some(ttl) = self.default_ttl_seconds {
            secret.default_ttl_seconds = ttl;
        }
        if let Some(ttl) = self.max_ttl_seconds {
            secret.max_ttl_seconds = ttl;
        }
        if let Some(reference) = self.authentication_ref {
            secret.authentication_ref = reference;
        }
    }
}

/// Check `0 < default <= max`
pub fn validate_ttl_bounds(default_ttl_seconds: u64, max_ttl_seconds: u64) -> Result<()> {
    if default_ttl_seconds == 0 || max_ttl_seconds == 0 {
        return Err(LeaseError::validation("TTL bounds must be positive"));
    }
    if default_ttl_seconds > max_ttl_seconds {
        return Err(LeaseError::validation_field(
            format!(
                "default TTL ({}s) cannot exceed max TTL ({}s)",
                default_ttl_seconds, max_ttl_seconds
            ),
            "default_ttl_seconds",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws(role_arn: &str) -> DynamicSecretConfig {
        DynamicSecretConfig::Aws(AwsConfig {
            role_arn: role_arn.to_string(),
            external_id: None,
            session_policy: None,
            role_session_name_template: None,
            region: None,
        })
    }

    #[test]
    fn test_provider_kind_roundtrip() {
        let parsed: ProviderKind = ProviderKind::Aws.as_str().parse().unwrap();
        assert_eq!(parsed, ProviderKind::Aws);
        assert!("GCP".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_config_serialization_is_tagged() {
        let json = serde_json::to_value(aws("arn:aws:iam::123456789012:role/deploy")).unwrap();
        assert_eq!(json["provider"], "AWS");
        assert_eq!(json["role_arn"], "arn:aws:iam::123456789012:role/deploy");
    }

    #[test]
    fn test_config_validation() {
        assert!(aws("arn:aws:iam::123456789012:role/deploy").validate().is_ok());
        assert!(aws("arn:aws:iam::123456789012:user/bob").validate().is_err());
        assert!(aws("deploy").validate().is_err());
    }

    #[test]
    fn test_ttl_bounds() {
        assert!(validate_ttl_bounds(900, 3600).is_ok());
        assert!(validate_ttl_bounds(3600, 3600).is_ok());
        assert!(validate_ttl_bounds(3601, 3600).is_err());
        assert!(validate_ttl_bounds(0, 3600).is_err());
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let now = Utc::now();
        let mut secret = DynamicSecret {
            id: DynamicSecretId::new(),
            environment_id: EnvironmentId::new(),
            name: "deploy".into(),
            path: "/".into(),
            provider: ProviderKind::Aws,
            config: aws("arn:aws:iam::123456789012:role/deploy"),
            default_ttl_seconds: 900,
            max_ttl_seconds: 3600,
            authentication_ref: "aws-main".into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        UpdateDynamicSecret { max_ttl_seconds: Some(7200), ..Default::default() }
            .apply_to(&mut secret);

        assert_eq!(secret.max_ttl_seconds, 7200);
        assert_eq!(secret.default_ttl_seconds, 900);
        assert_eq!(secret.name, "deploy");
    }
}
