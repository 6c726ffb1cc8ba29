//! Immutable lease audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::{LeaseEventId, LeaseId, MemberId, ServiceAccountId};
use super::lease::{LeaseStatus, Requester};

/// Event types, one per lease state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseEventType {
    Created,
    Active,
    Renewed,
    Expired,
    Revoked,
}

impl LeaseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Active => "ACTIVE",
            Self::Renewed => "RENEWED",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }
}

impl From<LeaseStatus> for LeaseEventType {
    fn from(status: LeaseStatus) -> Self {
        match status {
            LeaseStatus::Created => Self::Created,
            LeaseStatus::Active => Self::Active,
            LeaseStatus::Renewed => Self::Renewed,
            LeaseStatus::Expired => Self::Expired,
            LeaseStatus::Revoked => Self::Revoked,
        }
    }
}

impl FromStr for LeaseEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "ACTIVE" => Ok(Self::Active),
            "RENEWED" => Ok(Self::Renewed),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            _ => Err(format!("Unknown lease event type: {}", s)),
        }
    }
}

impl fmt::Display for LeaseEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who caused an event. `System` is the expiry sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Member(MemberId),
    ServiceAccount(ServiceAccountId),
    System,
}

impl Actor {
    pub fn member_id(&self) -> Option<&MemberId> {
        match self {
            Self::Member(id) => Some(id),
            _ => None,
        }
    }

    pub fn service_account_id(&self) -> Option<&ServiceAccountId> {
        match self {
            Self::ServiceAccount(id) => Some(id),
            _ => None,
        }
    }

    /// Rebuild from the two nullable storage columns
    pub fn from_columns(member: Option<String>, service_account: Option<String>) -> Self {
        match (member, service_account) {
            (Some(id), _) => Self::Member(MemberId::from_string(id)),
            (None, Some(id)) => Self::ServiceAccount(ServiceAccountId::from_string(id)),
            (None, None) => Self::System,
        }
    }
}

impl From<Requester> for Actor {
    fn from(requester: Requester) -> Self {
        match requester {
            Requester::Member(id) => Self::Member(id),
            Requester::ServiceAccount(id) => Self::ServiceAccount(id),
        }
    }
}

/// Client details captured from the incoming request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Actor and client details attached to every event an operation records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor: Actor,
    #[serde(default)]
    pub client: ClientMetadata,
}

impl RequestContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor, client: ClientMetadata::default() }
    }

    pub fn system() -> Self {
        Self::new(Actor::System)
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.client = ClientMetadata { ip_address, user_agent };
        self
    }
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseEvent {
    pub id: LeaseEventId,
    pub lease_id: LeaseId,
    pub event_type: LeaseEventType,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub client: ClientMetadata,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_from_columns() {
        assert_eq!(Actor::from_columns(None, None), Actor::System);
        assert!(matches!(Actor::from_columns(Some("m".into()), None), Actor::Member(_)));
        assert!(matches!(
            Actor::from_columns(None, Some("sa".into())),
            Actor::ServiceAccount(_)
        ));
    }

    #[test]
    fn test_event_type_matches_status_names() {
        for status in [LeaseStatus::Active, LeaseStatus::Renewed, LeaseStatus::Revoked] {
            assert_eq!(LeaseEventType::from(status).as_str(), status.as_str());
        }
        assert_eq!("EXPIRED".parse::<LeaseEventType>().unwrap(), LeaseEventType::Expired);
    }

    #[test]
    fn test_request_context_builder() {
        let ctx = RequestContext::new(Actor::Member(MemberId::from_string("m-1".into())))
            .with_client(Some("10.0.0.1".into()), Some("cli/1.0".into()));
        assert_eq!(ctx.client.ip_address.as_deref(), Some("10.0.0.1"));
    }
}
