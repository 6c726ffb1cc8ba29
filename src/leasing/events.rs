//! Lease event recording.
//!
//! Builds audit events and appends them to the event log. State-changing
//! operations hand a built event to the lease repository so the transition and
//! its record commit together; standalone appends go straight to the log.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::clock::Clock;
use crate::domain::{LeaseEvent, LeaseEventId, LeaseEventType, LeaseId, RequestContext};
use crate::errors::{LeaseError, Result};
use crate::storage::LeaseEventRepository;

#[derive(Clone)]
pub struct EventRecorder {
    repository: Arc<dyn LeaseEventRepository>,
    clock: Arc<dyn Clock>,
}

impl EventRecorder {
    pub fn new(repository: Arc<dyn LeaseEventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { repository: self.repository, clock }
    }

    /// Build an event stamped at `at` without persisting it
    pub fn build_at(
        &self,
        lease_id: &LeaseId,
        event_type: LeaseEventType,
        context: &RequestContext,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> LeaseEvent {
        LeaseEvent {
            id: LeaseEventId::new(),
            lease_id: lease_id.clone(),
            event_type,
            timestamp: at,
            actor: context.actor.clone(),
            client: context.client.clone(),
            metadata,
        }
    }

    /// Append an event stamped with the current time.
    ///
    /// Terminal events only come from the lease transitions that produce
    /// them, and nothing is appended after one.
    pub async fn append(
        &self,
        lease_id: &LeaseId,
        event_type: LeaseEventType,
        context: &RequestContext,
        metadata: serde_json::Value,
    ) -> Result<LeaseEvent> {
        if event_type.is_terminal() {
            return Err(LeaseError::validation_field(
                format!("{} events are recorded by lease transitions only", event_type),
                "event_type",
            ));
        }

        let event = self.build_at(lease_id, event_type, context, metadata, self.clock.now());
        self.repository.append(&event).await?;
        Ok(event)
    }

    /// Events for a lease in recorded order
    pub async fn history(&self, lease_id: &LeaseId) -> Result<Vec<LeaseEvent>> {
        self.repository.list_for_lease(lease_id).await
    }
}
