//! Dynamic secret repository
//!
//! Secrets are soft-deleted: `deleted_at` is set and the row is kept so that
//! existing leases and their audit history still resolve.

use crate::domain::{
    DynamicSecret, DynamicSecretConfig, DynamicSecretId, EnvironmentId, ProviderKind,
};
use crate::errors::{LeaseError, Result};
use crate::storage::repositories::lease_event::is_storage_transient;
use crate::storage::DbPool;
use crate::utils::{retry_with_backoff, RetryConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite};
use std::str::FromStr;
use tracing::instrument;

const SECRET_COLUMNS: &str = "id, environment_id, name, path, provider, config, default_ttl_seconds, max_ttl_seconds, authentication_ref, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, FromRow)]
struct DynamicSecretRow {
    pub id: String,
    pub environment_id: String,
    pub name: String,
    pub path: String,
    pub provider: String,
    pub config: String,
    pub default_ttl_seconds: i64,
    pub max_ttl_seconds: i64,
    pub authentication_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DynamicSecretRow> for DynamicSecret {
    type Error = LeaseError;

    fn try_from(row: DynamicSecretRow) -> Result<Self> {
        let provider = ProviderKind::from_str(&row.provider).map_err(|e| {
            LeaseError::internal(format!("Invalid provider '{}': {}", row.provider, e))
        })?;
        let config: DynamicSecretConfig = serde_json::from_str(&row.config).map_err(|e| {
            LeaseError::Serialization {
                source: e,
                context: format!("Invalid config for dynamic secret '{}'", row.id),
            }
        })?;

        Ok(DynamicSecret {
            id: DynamicSecretId::from_string(row.id),
            environment_id: EnvironmentId::from_string(row.environment_id),
            name: row.name,
            path: row.path,
            provider,
            config,
            default_ttl_seconds: row.default_ttl_seconds.max(0) as u64,
            max_ttl_seconds: row.max_ttl_seconds.max(0) as u64,
            authentication_ref: row.authentication_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[async_trait]
pub trait DynamicSecretRepository: Send + Sync {
    async fn create(&self, secret: &DynamicSecret) -> Result<()>;

    /// Get a live (not soft-deleted) secret
    async fn get(&self, id: &DynamicSecretId) -> Result<Option<DynamicSecret>>;

    /// Get a secret even if it has been soft-deleted
    async fn get_including_deleted(&self, id: &DynamicSecretId) -> Result<Option<DynamicSecret>>;

    /// Live secrets ordered by name, optionally limited to one environment
    async fn list(&self, environment_id: Option<&EnvironmentId>) -> Result<Vec<DynamicSecret>>;

    async fn update(&self, secret: &DynamicSecret) -> Result<()>;

    /// Returns false if the secret was missing or already deleted
    async fn soft_delete(&self, id: &DynamicSecretId, at: DateTime<Utc>) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct SqlxDynamicSecretRepository {
    pool: DbPool,
    retry: RetryConfig,
}

impl SqlxDynamicSecretRepository {
    pub fn new(pool: DbPool) -> Self {
        Self::with_retry(pool, RetryConfig::default())
    }

    pub fn with_retry(pool: DbPool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    async fn fetch(&self, id: &DynamicSecretId, include_deleted: bool) -> Result<Option<DynamicSecret>> {
        let pool = &self.pool;
        let query = if include_deleted {
            format!("SELECT {} FROM dynamic_secrets WHERE id = $1", SECRET_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM dynamic_secrets WHERE id = $1 AND deleted_at IS NULL",
                SECRET_COLUMNS
            )
        };
        let query = query.as_str();

        let row = retry_with_backoff(&self.retry, "get_dynamic_secret", is_storage_transient, || async move {
            sqlx::query_as::<Sqlite, DynamicSecretRow>(query)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| LeaseError::storage(e, format!("Failed to get dynamic secret '{}'", id)))
        })
        .await?;

        row.map(DynamicSecret::try_from).transpose()
    }
}

/// Map a unique-index violation on (environment_id, name) to a validation error
fn map_write_error(error: sqlx::Error, secret: &DynamicSecret, action: &str) -> LeaseError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.is_unique_violation() {
            return LeaseError::validation_field(
                format!(
                    "A dynamic secret named '{}' already exists in environment '{}'",
                    secret.name, secret.environment_id
                ),
                "name",
            );
        }
    }
    tracing::error!(error = %error, secret_id = %secret.id, "Failed to {} dynamic secret", action);
    LeaseError::storage(error, format!("Failed to {} dynamic secret '{}'", action, secret.id))
}

#[async_trait]
impl DynamicSecretRepository for SqlxDynamicSecretRepository {
    #[instrument(skip(self, secret), fields(secret_id = %secret.id, secret_name = %secret.name), name = "db_create_dynamic_secret")]
    async fn create(&self, secret: &DynamicSecret) -> Result<()> {
        let pool = &self.pool;
        let config = serde_json::to_string(&secret.config)?;
        let config = config.as_str();

        retry_with_backoff(&self.retry, "create_dynamic_secret", is_storage_transient, || async move {
            sqlx::query::<Sqlite>(
                "INSERT INTO dynamic_secrets (id, environment_id, name, path, provider, config, default_ttl_seconds, max_ttl_seconds, authentication_ref, created_at, updated_at, deleted_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL)",
            )
            .bind(&secret.id)
            .bind(&secret.environment_id)
            .bind(&secret.name)
            .bind(&secret.path)
            .bind(secret.provider.as_str())
            .bind(config)
            .bind(secret.default_ttl_seconds as i64)
            .bind(secret.max_ttl_seconds as i64)
            .bind(&secret.authentication_ref)
            .bind(secret.created_at)
            .bind(secret.updated_at)
            .execute(pool)
            .await
            .map_err(|e| map_write_error(e, secret, "create"))?;
            Ok::<_, LeaseError>(())
        })
        .await
    }

    async fn get(&self, id: &DynamicSecretId) -> Result<Option<DynamicSecret>> {
        self.fetch(id, false).await
    }

    async fn get_including_deleted(&self, id: &DynamicSecretId) -> Result<Option<DynamicSecret>> {
        self.fetch(id, true).await
    }

    #[instrument(skip(self), fields(environment_id = ?environment_id), name = "db_list_dynamic_secrets")]
    async fn list(&self, environment_id: Option<&EnvironmentId>) -> Result<Vec<DynamicSecret>> {
        let pool = &self.pool;
        let query = format!(
            "SELECT {} FROM dynamic_secrets WHERE ($1 IS NULL OR environment_id = $1) AND deleted_at IS NULL ORDER BY name ASC, rowid ASC",
            SECRET_COLUMNS
        );
        let query = query.as_str();

        let rows = retry_with_backoff(&self.retry, "list_dynamic_secrets", is_storage_transient, || async move {
            sqlx::query_as::<Sqlite, DynamicSecretRow>(query)
                .bind(environment_id.map(EnvironmentId::as_str))
                .fetch_all(pool)
                .await
                .map_err(|e| LeaseError::storage(e, "Failed to list dynamic secrets"))
        })
        .await?;

        rows.into_iter().map(DynamicSecret::try_from).collect()
    }

    #[instrument(skip(self, secret), fields(secret_id = %secret.id), name = "db_update_dynamic_secret")]
    async fn update(&self, secret: &DynamicSecret) -> Result<()> {
        let pool = &self.pool;
        let config = serde_json::to_string(&secret.config)?;
        let config = config.as_str();

        let updated = retry_with_backoff(&self.retry, "update_dynamic_secret", is_storage_transient, || async move {
            let result = sqlx::query::<Sqlite>(
                "UPDATE dynamic_secrets SET name = $1, path = $2, provider = $3, config = $4, default_ttl_seconds = $5, max_ttl_seconds = $6, authentication_ref = $7, updated_at = $8 \
                 WHERE id = $9 AND deleted_at IS NULL",
            )
            .bind(&secret.name)
            .bind(&secret.path)
            .bind(secret.provider.as_str())
            .bind(config)
            .bind(secret.default_ttl_seconds as i64)
            .bind(secret.max_ttl_seconds as i64)
            .bind(&secret.authentication_ref)
            .bind(secret.updated_at)
            .bind(&secret.id)
            .execute(pool)
            .await
            .map_err(|e| map_write_error(e, secret, "update"))?;
            Ok::<_, LeaseError>(result.rows_affected())
        })
        .await?;

        if updated == 0 {
            return Err(LeaseError::secret_not_found(secret.id.as_str()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(secret_id = %id), name = "db_soft_delete_dynamic_secret")]
    async fn soft_delete(&self, id: &DynamicSecretId, at: DateTime<Utc>) -> Result<bool> {
        let pool = &self.pool;
        let affected = retry_with_backoff(&self.retry, "delete_dynamic_secret", is_storage_transient, || async move {
            sqlx::query::<Sqlite>(
                "UPDATE dynamic_secrets SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
            )
            .bind(at)
            .bind(id)
            .execute(pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| LeaseError::storage(e, format!("Failed to delete dynamic secret '{}'", id)))
        })
        .await?;

        Ok(affected > 0)
    }
}
