//! Lease repository
//!
//! Lease rows carry a `version` column. Every state change is a compare-and-swap
//! on that version and commits in the same transaction as its lease event, so a
//! lease can never change state without a matching audit record and two racing
//! writers can never both win.

use crate::domain::{
    DynamicSecretId, Lease, LeaseEvent, LeaseId, LeaseStatus, MemberId, Requester,
    ServiceAccountId,
};
use crate::errors::{LeaseError, Result};
use crate::storage::repositories::lease_event::{insert_event, is_storage_transient};
use crate::storage::DbPool;
use crate::utils::{retry_with_backoff, RetryConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqliteConnection};
use std::str::FromStr;
use tracing::instrument;

const LEASE_COLUMNS: &str = "id, secret_id, name, requester_member_id, requester_service_account_id, ttl_seconds, status, provider_reference, version, created_at, updated_at, expires_at, revoked_at";

#[derive(Debug, Clone, FromRow)]
struct LeaseRow {
    pub id: String,
    pub secret_id: String,
    pub name: String,
    pub requester_member_id: Option<String>,
    pub requester_service_account_id: Option<String>,
    pub ttl_seconds: i64,
    pub status: String,
    pub provider_reference: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<LeaseRow> for Lease {
    type Error = LeaseError;

    fn try_from(row: LeaseRow) -> Result<Self> {
        let status = LeaseStatus::from_str(&row.status).map_err(|e| {
            LeaseError::internal(format!("Invalid lease status '{}': {}", row.status, e))
        })?;

        let requester = match (row.requester_member_id, row.requester_service_account_id) {
            (Some(member), None) => Requester::Member(MemberId::from_string(member)),
            (None, Some(account)) => {
                Requester::ServiceAccount(ServiceAccountId::from_string(account))
            }
            _ => {
                return Err(LeaseError::internal(format!(
                    "Lease '{}' must have exactly one requester",
                    row.id
                )))
            }
        };

        Ok(Lease {
            id: LeaseId::from_string(row.id),
            name: row.name,
            secret_id: DynamicSecretId::from_string(row.secret_id),
            requester,
            ttl_seconds: row.ttl_seconds.max(0) as u64,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            provider_reference: row.provider_reference,
            version: row.version,
        })
    }
}

/// A guarded state change: applies only if the stored lease still has `expected_version`
/// and is not terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseTransition {
    pub lease_id: LeaseId,
    pub expected_version: i64,
    pub status: LeaseStatus,
    pub ttl_seconds: u64,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Replaces the stored provider reference when set
    pub provider_reference: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LeaseTransition {
    pub fn renew(
        lease: &Lease,
        ttl_seconds: u64,
        expires_at: DateTime<Utc>,
        provider_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            lease_id: lease.id.clone(),
            expected_version: lease.version,
            status: LeaseStatus::Renewed,
            ttl_seconds,
            expires_at,
            revoked_at: None,
            provider_reference,
            updated_at: now,
        }
    }

    pub fn revoke(lease: &Lease, now: DateTime<Utc>) -> Self {
        Self {
            lease_id: lease.id.clone(),
            expected_version: lease.version,
            status: LeaseStatus::Revoked,
            ttl_seconds: lease.ttl_seconds,
            expires_at: lease.expires_at,
            revoked_at: Some(now),
            provider_reference: None,
            updated_at: now,
        }
    }

    pub fn expire(lease: &Lease, now: DateTime<Utc>) -> Self {
        Self {
            lease_id: lease.id.clone(),
            expected_version: lease.version,
            status: LeaseStatus::Expired,
            ttl_seconds: lease.ttl_seconds,
            expires_at: lease.expires_at,
            revoked_at: None,
            provider_reference: None,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Insert a new lease together with its first event
    async fn insert_with_event(&self, lease: &Lease, event: &LeaseEvent) -> Result<()>;

    async fn get(&self, id: &LeaseId) -> Result<Option<Lease>>;

    /// Leases for a secret, newest first
    async fn list_by_secret(&self, secret_id: &DynamicSecretId) -> Result<Vec<Lease>>;

    /// Non-terminal leases whose expiry is at or before `now`, oldest expiry first
    async fn list_lapsed(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Lease>>;

    /// Apply a guarded transition and append its event atomically.
    ///
    /// Returns `None` when the lease was changed concurrently or is already
    /// terminal; nothing is written in that case.
    async fn transition(
        &self,
        transition: &LeaseTransition,
        event: &LeaseEvent,
    ) -> Result<Option<Lease>>;
}

#[derive(Debug, Clone)]
pub struct SqlxLeaseRepository {
    pool: DbPool,
    retry: RetryConfig,
}

impl SqlxLeaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self::with_retry(pool, RetryConfig::default())
    }

    pub fn with_retry(pool: DbPool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    async fn insert_once(&self, lease: &Lease, event: &LeaseEvent) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LeaseError::storage(e, "Failed to start lease transaction"))?;

        sqlx::query::<Sqlite>(
            "INSERT INTO dynamic_secret_leases (id, secret_id, name, requester_member_id, requester_service_account_id, ttl_seconds, status, provider_reference, version, created_at, updated_at, expires_at, revoked_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&lease.id)
        .bind(&lease.secret_id)
        .bind(&lease.name)
        .bind(lease.requester.member_id())
        .bind(lease.requester.service_account_id())
        .bind(lease.ttl_seconds as i64)
        .bind(lease.status.as_str())
        .bind(lease.provider_reference.as_deref())
        .bind(lease.version)
        .bind(lease.created_at)
        .bind(lease.updated_at)
        .bind(lease.expires_at)
        .bind(lease.revoked_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, lease_id = %lease.id, "Failed to insert lease");
            LeaseError::storage(e, format!("Failed to insert lease '{}'", lease.id))
        })?;

        insert_event(&mut *tx, event).await?;

        tx.commit()
            .await
            .map_err(|e| LeaseError::storage(e, "Failed to commit lease creation"))?;

        Ok(())
    }

    async fn transition_once(
        &self,
        transition: &LeaseTransition,
        event: &LeaseEvent,
    ) -> Result<Option<Lease>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LeaseError::storage(e, "Failed to start lease transaction"))?;

        let result = sqlx::query::<Sqlite>(
            "UPDATE dynamic_secret_leases \
             SET status = $1, ttl_seconds = $2, expires_at = $3, revoked_at = $4, \
                 provider_reference = COALESCE($5, provider_reference), updated_at = $6, version = version + 1 \
             WHERE id = $7 AND version = $8 AND status NOT IN ('EXPIRED', 'REVOKED')",
        )
        .bind(transition.status.as_str())
        .bind(transition.ttl_seconds as i64)
        .bind(transition.expires_at)
        .bind(transition.revoked_at)
        .bind(transition.provider_reference.as_deref())
        .bind(transition.updated_at)
        .bind(&transition.lease_id)
        .bind(transition.expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            LeaseError::storage(e, format!("Failed to update lease '{}'", transition.lease_id))
        })?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                lease_id = %transition.lease_id,
                expected_version = transition.expected_version,
                "Lease transition lost to a concurrent change"
            );
            return Ok(None);
        }

        insert_event(&mut *tx, event).await?;
        let lease = fetch_lease(&mut *tx, &transition.lease_id).await?;

        tx.commit()
            .await
            .map_err(|e| LeaseError::storage(e, "Failed to commit lease transition"))?;

        Ok(lease)
    }
}

async fn fetch_lease(conn: &mut SqliteConnection, id: &LeaseId) -> Result<Option<Lease>> {
    let query = format!("SELECT {} FROM dynamic_secret_leases WHERE id = $1", LEASE_COLUMNS);
    let row = sqlx::query_as::<Sqlite, LeaseRow>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|e| LeaseError::storage(e, format!("Failed to get lease '{}'", id)))?;

    row.map(Lease::try_from).transpose()
}

#[async_trait]
impl LeaseRepository for SqlxLeaseRepository {
    #[instrument(skip(self, lease, event), fields(lease_id = %lease.id, secret_id = %lease.secret_id), name = "db_insert_lease")]
    async fn insert_with_event(&self, lease: &Lease, event: &LeaseEvent) -> Result<()> {
        retry_with_backoff(&self.retry, "insert_lease", is_storage_transient, || {
            self.insert_once(lease, event)
        })
        .await
    }

    #[instrument(skip(self), fields(lease_id = %id), name = "db_get_lease")]
    async fn get(&self, id: &LeaseId) -> Result<Option<Lease>> {
        let pool = &self.pool;
        retry_with_backoff(&self.retry, "get_lease", is_storage_transient, || async move {
            let mut conn = pool
                .acquire()
                .await
                .map_err(|e| LeaseError::storage(e, "Failed to acquire connection"))?;
            fetch_lease(&mut conn, id).await
        })
        .await
    }

    #[instrument(skip(self), fields(secret_id = %secret_id), name = "db_list_leases_by_secret")]
    async fn list_by_secret(&self, secret_id: &DynamicSecretId) -> Result<Vec<Lease>> {
        let pool = &self.pool;
        let query = format!(
            "SELECT {} FROM dynamic_secret_leases WHERE secret_id = $1 ORDER BY created_at DESC, rowid DESC",
            LEASE_COLUMNS
        );
        let query = query.as_str();

        let rows = retry_with_backoff(&self.retry, "list_leases", is_storage_transient, || async move {
            sqlx::query_as::<Sqlite, LeaseRow>(query)
                .bind(secret_id)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    LeaseError::storage(e, format!("Failed to list leases for secret '{}'", secret_id))
                })
        })
        .await?;

        rows.into_iter().map(Lease::try_from).collect()
    }

    #[instrument(skip(self), fields(limit = limit), name = "db_list_lapsed_leases")]
    async fn list_lapsed(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Lease>> {
        let pool = &self.pool;
        let query = format!(
            "SELECT {} FROM dynamic_secret_leases \
             WHERE status IN ('CREATED', 'ACTIVE', 'RENEWED') AND expires_at <= $1 \
             ORDER BY expires_at ASC LIMIT $2",
            LEASE_COLUMNS
        );
        let query = query.as_str();

        let rows = retry_with_backoff(&self.retry, "list_lapsed_leases", is_storage_transient, || async move {
            sqlx::query_as::<Sqlite, LeaseRow>(query)
                .bind(now)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| LeaseError::storage(e, "Failed to list lapsed leases"))
        })
        .await?;

        rows.into_iter().map(Lease::try_from).collect()
    }

    #[instrument(skip(self, transition, event), fields(lease_id = %transition.lease_id, status = %transition.status), name = "db_transition_lease")]
    async fn transition(
        &self,
        transition: &LeaseTransition,
        event: &LeaseEvent,
    ) -> Result<Option<Lease>> {
        retry_with_backoff(&self.retry, "transition_lease", is_storage_transient, || {
            self.transition_once(transition, event)
        })
        .await
    }
}
