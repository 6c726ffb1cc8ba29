//! # Domain Model
//!
//! Dynamic secrets, the leases issued against them and the audit events each
//! lease accumulates.

pub mod dynamic_secret;
pub mod id;
pub mod lease;
pub mod lease_event;
pub mod sensitive;

pub use dynamic_secret::{
    validate_ttl_bounds, AwsConfig, DynamicSecret, DynamicSecretConfig, NewDynamicSecret,
    ProviderKind, UpdateDynamicSecret,
};
pub use id::{DynamicSecretId, EnvironmentId, LeaseEventId, LeaseId, MemberId, ServiceAccountId};
pub use lease::{IssuedLease, Lease, LeaseCredentials, LeaseStatus, Requester};
pub use lease_event::{Actor, ClientMetadata, LeaseEvent, LeaseEventType, RequestContext};
pub use sensitive::SecretString;
