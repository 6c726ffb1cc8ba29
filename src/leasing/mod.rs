//! # Leasing Engine
//!
//! Everything between an admin-configured [`DynamicSecret`] and the
//! short-lived credentials handed to a requester:
//!
//! - [`TtlPolicy`] checks requested TTLs against the floor and the secret's bounds
//! - [`LeaseLifecycleManager`] creates, renews, revokes and expires leases
//! - [`EventRecorder`] builds and appends audit events
//! - [`ExpirySweeper`] expires lapsed leases in the background
//! - [`DynamicSecretService`] administers the secrets themselves
//!
//! [`DynamicSecret`]: crate::domain::DynamicSecret

pub mod clock;
pub mod events;
pub mod guards;
pub mod manager;
pub mod secrets;
pub mod sweeper;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::EventRecorder;
pub use guards::{LeaseGuard, LeaseGuards};
pub use manager::{CreateLeaseRequest, LeaseLifecycleManager, LeaseStores};
pub use secrets::DynamicSecretService;
pub use sweeper::ExpirySweeper;
pub use ttl::{TtlPolicy, MINIMUM_LEASE_TTL_SECONDS};
