//! Lease records and the credentials revealed at issuance.
//!
//! [`Lease`] is what storage holds and what every read path returns. Issued
//! credentials only ever exist inside an [`IssuedLease`], the direct result of a
//! create or renew call; there is no field on [`Lease`] that could carry them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::dynamic_secret::ProviderKind;
use super::id::{DynamicSecretId, LeaseId, MemberId, ServiceAccountId};
use super::sensitive::SecretString;

/// Lease status values as stored and exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStatus {
    Created,
    Active,
    Renewed,
    Expired,
    Revoked,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Active => "ACTIVE",
            Self::Renewed => "RENEWED",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        }
    }

    /// EXPIRED and REVOKED leases never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }
}

impl FromStr for LeaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "ACTIVE" => Ok(Self::Active),
            "RENEWED" => Ok(Self::Renewed),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            _ => Err(format!("Unknown lease status: {}", s)),
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who requested a lease; a member and a service account are mutually exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Requester {
    Member(MemberId),
    ServiceAccount(ServiceAccountId),
}

impl Requester {
    pub fn member_id(&self) -> Option<&MemberId> {
        match self {
            Self::Member(id) => Some(id),
            Self::ServiceAccount(_) => None,
        }
    }

    pub fn service_account_id(&self) -> Option<&ServiceAccountId> {
        match self {
            Self::Member(_) => None,
            Self::ServiceAccount(id) => Some(id),
        }
    }
}

/// A single issuance of credentials against a dynamic secret
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub name: String,
    pub secret_id: DynamicSecretId,
    pub requester: Requester,
    pub ttl_seconds: u64,
    pub status: LeaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Provider-assigned identifier used for revocation
    #[serde(skip)]
    pub provider_reference: Option<String>,
    /// Optimistic concurrency version, bumped on every transition
    #[serde(skip)]
    pub version: i64,
}

impl Lease {
    /// Non-terminal and past its expiry
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at <= now
    }
}

/// Credential fields returned once to the caller
#[derive(Clone, PartialEq, Serialize)]
pub struct LeaseCredentials {
    pub provider: ProviderKind,
    pub fields: BTreeMap<String, SecretString>,
}

impl LeaseCredentials {
    pub fn new(provider: ProviderKind, fields: BTreeMap<String, SecretString>) -> Self {
        Self { provider, fields }
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.fields.get(key)
    }

    /// Plaintext view for the one-time response to the requester
    pub fn reveal(&self) -> BTreeMap<String, String> {
        self.fields.iter().map(|(k, v)| (k.clone(), v.expose_secret().to_string())).collect()
    }
}

impl fmt::Debug for LeaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseCredentials")
            .field("provider", &self.provider)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Result of create and renew: the lease plus credentials when freshly minted
#[derive(Debug, Clone, Serialize)]
pub struct IssuedLease {
    #[serde(flatten)]
    pub lease: Lease,
    pub credentials: Option<LeaseCredentials>,
}
