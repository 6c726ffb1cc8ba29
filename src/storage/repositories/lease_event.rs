//! Lease event repository
//!
//! Append-only audit log for lease state transitions. Rows are never updated
//! or deleted; the schema enforces this with triggers.

use crate::domain::{Actor, ClientMetadata, LeaseEvent, LeaseEventId, LeaseEventType, LeaseId};
use crate::errors::{LeaseError, Result};
use crate::storage::DbPool;
use crate::utils::{retry_with_backoff, RetryConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqliteConnection};
use std::str::FromStr;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct LeaseEventRow {
    pub id: String,
    pub lease_id: String,
    pub event_type: String,
    pub actor_member_id: Option<String>,
    pub actor_service_account_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<LeaseEventRow> for LeaseEvent {
    type Error = LeaseError;

    fn try_from(row: LeaseEventRow) -> Result<Self> {
        let event_type = LeaseEventType::from_str(&row.event_type).map_err(|e| {
            LeaseError::internal(format!("Invalid lease event type '{}': {}", row.event_type, e))
        })?;
        let metadata = serde_json::from_str(&row.metadata)?;

        Ok(LeaseEvent {
            id: LeaseEventId::from_string(row.id),
            lease_id: LeaseId::from_string(row.lease_id),
            event_type,
            timestamp: row.timestamp,
            actor: Actor::from_columns(row.actor_member_id, row.actor_service_account_id),
            client: ClientMetadata { ip_address: row.ip_address, user_agent: row.user_agent },
            metadata,
        })
    }
}

/// Insert one event on an existing connection or transaction.
///
/// Used directly by the lease repository so that a state change and its event
/// commit together.
pub(crate) async fn insert_event(conn: &mut SqliteConnection, event: &LeaseEvent) -> Result<()> {
    let metadata = serde_json::to_string(&event.metadata)?;

    sqlx::query::<Sqlite>(
        "INSERT INTO dynamic_secret_lease_events (id, lease_id, event_type, actor_member_id, actor_service_account_id, ip_address, user_agent, metadata, timestamp) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(&event.id)
    .bind(&event.lease_id)
    .bind(event.event_type.as_str())
    .bind(event.actor.member_id())
    .bind(event.actor.service_account_id())
    .bind(event.client.ip_address.as_deref())
    .bind(event.client.user_agent.as_deref())
    .bind(metadata)
    .bind(event.timestamp)
    .execute(conn)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, lease_id = %event.lease_id, event_type = %event.event_type, "Failed to append lease event");
        LeaseError::storage(e, format!("Failed to append {} event for lease '{}'", event.event_type, event.lease_id))
    })?;

    Ok(())
}

#[async_trait]
pub trait LeaseEventRepository: Send + Sync {
    /// Append an event outside of any state change.
    ///
    /// Only live leases accept events: an expired or revoked lease fails with
    /// `LeaseTerminal`, an unknown one with `LeaseNotFound`.
    async fn append(&self, event: &LeaseEvent) -> Result<()>;

    /// All events for a lease in the order they were recorded
    async fn list_for_lease(&self, lease_id: &LeaseId) -> Result<Vec<LeaseEvent>>;
}

#[derive(Debug, Clone)]
pub struct SqlxLeaseEventRepository {
    pool: DbPool,
    retry: RetryConfig,
}

impl SqlxLeaseEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self::with_retry(pool, RetryConfig::default())
    }

    pub fn with_retry(pool: DbPool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl LeaseEventRepository for SqlxLeaseEventRepository {
    #[instrument(skip(self, event), fields(lease_id = %event.lease_id, event_type = %event.event_type), name = "db_append_lease_event")]
    async fn append(&self, event: &LeaseEvent) -> Result<()> {
        let pool = &self.pool;
        retry_with_backoff(&self.retry, "append_lease_event", is_storage_transient, || async move {
            let metadata = serde_json::to_string(&event.metadata)?;

            // Status check and insert are one statement so a concurrent
            // terminal transition cannot slip in between them
            let result = sqlx::query::<Sqlite>(
                "INSERT INTO dynamic_secret_lease_events (id, lease_id, event_type, actor_member_id, actor_service_account_id, ip_address, user_agent, metadata, timestamp) \
                 SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9 \
                 WHERE EXISTS (SELECT 1 FROM dynamic_secret_leases WHERE id = $2 AND status NOT IN ('EXPIRED', 'REVOKED'))",
            )
            .bind(&event.id)
            .bind(&event.lease_id)
            .bind(event.event_type.as_str())
            .bind(event.actor.member_id())
            .bind(event.actor.service_account_id())
            .bind(event.client.ip_address.as_deref())
            .bind(event.client.user_agent.as_deref())
            .bind(metadata)
            .bind(event.timestamp)
            .execute(pool)
            .await
            .map_err(|e| {
                LeaseError::storage(e, format!("Failed to append {} event for lease '{}'", event.event_type, event.lease_id))
            })?;

            if result.rows_affected() > 0 {
                return Ok(());
            }

            let status: Option<String> =
                sqlx::query_scalar::<Sqlite, String>("SELECT status FROM dynamic_secret_leases WHERE id = $1")
                    .bind(&event.lease_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| LeaseError::storage(e, format!("Failed to load lease '{}'", event.lease_id)))?;

            match status {
                Some(status) => Err(LeaseError::lease_terminal(event.lease_id.as_str(), status)),
                None => Err(LeaseError::lease_not_found(event.lease_id.as_str())),
            }
        })
        .await
    }

    #[instrument(skip(self), fields(lease_id = %lease_id), name = "db_list_lease_events")]
    async fn list_for_lease(&self, lease_id: &LeaseId) -> Result<Vec<LeaseEvent>> {
        let pool = &self.pool;
        let rows = retry_with_backoff(&self.retry, "list_lease_events", is_storage_transient, || async move {
            sqlx::query_as::<Sqlite, LeaseEventRow>(
                "SELECT id, lease_id, event_type, actor_member_id, actor_service_account_id, ip_address, user_agent, metadata, timestamp \
                 FROM dynamic_secret_lease_events WHERE lease_id = $1 ORDER BY timestamp ASC, rowid ASC",
            )
            .bind(lease_id)
            .fetch_all(pool)
            .await
            .map_err(|e| LeaseError::storage(e, format!("Failed to list events for lease '{}'", lease_id)))
        })
        .await?;

        rows.into_iter().map(LeaseEvent::try_from).collect()
    }
}

/// Retry predicate shared by the SQLx repositories
pub(crate) fn is_storage_transient(error: &LeaseError) -> bool {
    matches!(error, LeaseError::StorageUnavailable { .. })
}
