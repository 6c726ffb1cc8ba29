//! Dynamic secret administration.
//!
//! Create, update, soft-delete and read the secrets leases are issued
//! against. Soft-deleted secrets stop accepting new leases; their existing
//! leases keep resolving for renewal checks, revocation and expiry.

use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::clock::{Clock, SystemClock};
use super::ttl::TtlPolicy;
use crate::domain::{
    validate_ttl_bounds, DynamicSecret, DynamicSecretId, EnvironmentId, NewDynamicSecret,
    UpdateDynamicSecret,
};
use crate::errors::{LeaseError, Result};
use crate::storage::DynamicSecretRepository;

pub struct DynamicSecretService {
    repository: Arc<dyn DynamicSecretRepository>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
}

impl DynamicSecretService {
    pub fn new(repository: Arc<dyn DynamicSecretRepository>, policy: TtlPolicy) -> Self {
        Self { repository, policy, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[instrument(skip(self, request), fields(secret_name = %request.name, environment_id = %request.environment_id), name = "create_dynamic_secret")]
    pub async fn create(&self, request: NewDynamicSecret) -> Result<DynamicSecret> {
        request.validate()?;
        request.config.validate()?;
        self.check_ttl_bounds(request.default_ttl_seconds, request.max_ttl_seconds)?;

        let now = self.clock.now();
        let secret = DynamicSecret {
            id: DynamicSecretId::new(),
            environment_id: request.environment_id,
            name: request.name.trim().to_string(),
            path: request.path,
            provider: request.config.kind(),
            config: request.config,
            default_ttl_seconds: request.default_ttl_seconds,
            max_ttl_seconds: request.max_ttl_seconds,
            authentication_ref: request.authentication_ref,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.repository.create(&secret).await?;

        info!(
            secret_id = %secret.id,
            secret_name = %secret.name,
            provider = %secret.provider,
            "Dynamic secret created"
        );

        Ok(secret)
    }

    #[instrument(skip(self, update), fields(secret_id = %id), name = "update_dynamic_secret")]
    pub async fn update(&self, id: &DynamicSecretId, update: UpdateDynamicSecret) -> Result<DynamicSecret> {
        let mut secret = self.get(id).await?;

        if let Some(name) = &update.name {
            if name.trim().is_empty() || name.len() > 128 {
                return Err(LeaseError::validation_field("Name must be 1-128 characters", "name"));
            }
        }
        if matches!(&update.path, Some(path) if path.is_empty()) {
            return Err(LeaseError::validation_field("Path cannot be empty", "path"));
        }
        if matches!(&update.authentication_ref, Some(reference) if reference.is_empty()) {
            return Err(LeaseError::validation_field(
                "Authentication reference cannot be empty",
                "authentication_ref",
            ));
        }
        if let Some(config) = &update.config {
            config.validate()?;
        }

        update.apply_to(&mut secret);
        secret.name = secret.name.trim().to_string();
        self.check_ttl_bounds(secret.default_ttl_seconds, secret.max_ttl_seconds)?;
        secret.updated_at = self.clock.now();

        self.repository.update(&secret).await?;

        info!(secret_id = %secret.id, secret_name = %secret.name, "Dynamic secret updated");

        Ok(secret)
    }

    /// Mark a secret deleted. Its leases are left as they are.
    #[instrument(skip(self), fields(secret_id = %id), name = "soft_delete_dynamic_secret")]
    pub async fn soft_delete(&self, id: &DynamicSecretId) -> Result<()> {
        if !self.repository.soft_delete(id, self.clock.now()).await? {
            return Err(LeaseError::secret_not_found(id.as_str()));
        }
        info!(secret_id = %id, "Dynamic secret deleted");
        Ok(())
    }

    pub async fn get(&self, id: &DynamicSecretId) -> Result<DynamicSecret> {
        self.repository.get(id).await?.ok_or_else(|| LeaseError::secret_not_found(id.as_str()))
    }

    pub async fn list(&self, environment_id: Option<&EnvironmentId>) -> Result<Vec<DynamicSecret>> {
        self.repository.list(environment_id).await
    }

    /// Bounds must be ordered, and the default must itself be a leasable TTL
    fn check_ttl_bounds(&self, default_ttl_seconds: u64, max_ttl_seconds: u64) -> Result<()> {
        validate_ttl_bounds(default_ttl_seconds, max_ttl_seconds)?;
        if default_ttl_seconds <= self.policy.minimum_ttl_seconds() {
            return Err(LeaseError::validation_field(
                format!(
                    "default TTL ({}s) must be greater than the minimum lease TTL ({}s)",
                    default_ttl_seconds,
                    self.policy.minimum_ttl_seconds()
                ),
                "default_ttl_seconds",
            ));
        }
        Ok(())
    }
}
