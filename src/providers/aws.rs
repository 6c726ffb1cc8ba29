//! AWS STS credential provider
//!
//! Issues temporary credentials by assuming the IAM role named in the secret's
//! configuration. The caller credentials come from the resolved
//! authentication material (`access_key_id`, `secret_access_key`, optional
//! `session_token` and `region`).
//!
//! STS temporary credentials cannot be revoked before they expire, so
//! [`CredentialProvider::revoke`] always reports the operation unsupported.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_sts::config::http::HttpResponse;
use aws_sdk_sts::config::{Credentials, Region};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::operation::assume_role::AssumeRoleError;
use std::collections::BTreeMap;

use super::auth::ProviderAuthentication;
use super::error::ProviderError;
use super::provider::{CredentialProvider, CredentialSet, IssueRequest, RevokeRequest};
use crate::config::ProviderConfig;
use crate::domain::{AwsConfig, DynamicSecretConfig, ProviderKind, SecretString};

/// STS rejects session durations outside this range
const MIN_SESSION_SECONDS: u64 = 900;
const MAX_SESSION_SECONDS: u64 = 43_200;

/// STS limit on `RoleSessionName`
const MAX_SESSION_NAME_LEN: usize = 64;

const DEFAULT_SESSION_NAME_TEMPLATE: &str = "leasekeeper-{{lease_id}}";
const FALLBACK_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct AwsStsProvider {
    sdk_config: SdkConfig,
    default_region: String,
}

impl AwsStsProvider {
    pub async fn from_config(config: &ProviderConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let default_region = config
            .aws_default_region
            .clone()
            .or_else(|| sdk_config.region().map(|r| r.to_string()))
            .unwrap_or_else(|| FALLBACK_REGION.to_string());

        tracing::info!(default_region = %default_region, "AWS STS provider configured");
        Self { sdk_config, default_region }
    }

    fn client(&self, aws: &AwsConfig, auth: &ProviderAuthentication) -> Result<aws_sdk_sts::Client, ProviderError> {
        let access_key_id = auth.require("access_key_id")?;
        let secret_access_key = auth.require("secret_access_key")?;
        let session_token = auth.get("session_token").map(|t| t.expose_secret().to_string());

        let region = aws
            .region
            .clone()
            .or_else(|| auth.get("region").map(|r| r.expose_secret().to_string()))
            .unwrap_or_else(|| self.default_region.clone());

        let credentials = Credentials::new(
            access_key_id.expose_secret(),
            secret_access_key.expose_secret(),
            session_token,
            None,
            "leasekeeper",
        );

        let config = aws_sdk_sts::config::Builder::from(&self.sdk_config)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .build();

        Ok(aws_sdk_sts::Client::from_conf(config))
    }
}

fn secret_aws_config(config: &DynamicSecretConfig) -> Result<&AwsConfig, ProviderError> {
    match config {
        DynamicSecretConfig::Aws(aws) => Ok(aws),
    }
}

/// Render the role session name, keeping only characters STS accepts
fn session_name(template: Option<&str>, lease_id: &str, secret_name: &str) -> String {
    let rendered = template
        .unwrap_or(DEFAULT_SESSION_NAME_TEMPLATE)
        .replace("{{lease_id}}", lease_id)
        .replace("{{secret_name}}", secret_name);

    let mut name: String = rendered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "+=,.@-_".contains(c) { c } else { '-' })
        .take(MAX_SESSION_NAME_LEN)
        .collect();

    if name.len() < 2 {
        name = format!("leasekeeper-{}", lease_id).chars().take(MAX_SESSION_NAME_LEN).collect();
    }
    name
}

/// STS session length for a lease TTL.
///
/// Outside the STS range the credentials and the lease disagree: short leases
/// get credentials that outlive them and cannot be revoked, long leases get
/// credentials that lapse before they do.
fn session_duration(lease_id: &str, ttl_seconds: u64) -> i32 {
    let duration = ttl_seconds.clamp(MIN_SESSION_SECONDS, MAX_SESSION_SECONDS);
    if duration > ttl_seconds {
        tracing::warn!(
            lease_id,
            ttl_seconds,
            session_seconds = duration,
            "Lease TTL below the STS minimum; credentials stay valid after the lease expires"
        );
    } else if duration < ttl_seconds {
        tracing::warn!(
            lease_id,
            ttl_seconds,
            session_seconds = duration,
            "Lease TTL above the STS maximum; credentials expire before the lease"
        );
    }
    duration as i32
}

fn map_assume_role_error(error: SdkError<AssumeRoleError, HttpResponse>) -> ProviderError {
    let message = DisplayErrorContext(&error).to_string();
    match &error {
        SdkError::ServiceError(service) => ProviderError::classify(
            service.err().code(),
            Some(service.raw().status().as_u16()),
            service.err().message().unwrap_or(&message).to_string(),
        ),
        SdkError::ConstructionFailure(_) => ProviderError::rejected(message),
        _ => ProviderError::unavailable(message),
    }
}

#[async_trait]
impl CredentialProvider for AwsStsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    async fn issue(&self, request: &IssueRequest<'_>) -> Result<CredentialSet, ProviderError> {
        let aws = secret_aws_config(&request.secret.config)?;
        let client = self.client(aws, request.authentication)?;

        let session_name = session_name(
            aws.role_session_name_template.as_deref(),
            request.lease_id.as_str(),
            &request.secret.name,
        );

        let mut assume_role = client
            .assume_role()
            .role_arn(&aws.role_arn)
            .role_session_name(&session_name)
            .duration_seconds(session_duration(request.lease_id.as_str(), request.ttl.as_secs()));

        if let Some(external_id) = &aws.external_id {
            assume_role = assume_role.external_id(external_id);
        }
        if let Some(policy) = &aws.session_policy {
            assume_role = assume_role.policy(policy.to_string());
        }

        let output = assume_role.send().await.map_err(map_assume_role_error)?;

        let credentials = output
            .credentials()
            .ok_or_else(|| ProviderError::unavailable("AssumeRole returned no credentials"))?;

        let mut fields = BTreeMap::new();
        fields.insert("access_key_id".to_string(), SecretString::new(credentials.access_key_id()));
        fields.insert(
            "secret_access_key".to_string(),
            SecretString::new(credentials.secret_access_key()),
        );
        fields.insert("session_token".to_string(), SecretString::new(credentials.session_token()));

        let assumed_role_id = output.assumed_role_user().map(|user| user.assumed_role_id().to_string());

        tracing::info!(
            lease_id = %request.lease_id,
            role_arn = %aws.role_arn,
            session_name = %session_name,
            assumed_role_id = ?assumed_role_id,
            "Assumed role for lease"
        );

        let mut set = CredentialSet::new(fields);
        set.provider_reference = assumed_role_id;
        Ok(set)
    }

    async fn revoke(&self, request: &RevokeRequest<'_>) -> Result<(), ProviderError> {
        tracing::debug!(
            lease_id = %request.lease_id,
            provider_reference = ?request.provider_reference,
            "STS credentials cannot be revoked early"
        );
        Err(ProviderError::Unsupported { provider: ProviderKind::Aws, operation: "revoke" })
    }
}
