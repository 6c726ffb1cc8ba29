//! Repository modules for data access
//!
//! Each repository is a trait with a SQLx implementation so the lifecycle
//! manager can be exercised against alternative stores.

pub mod dynamic_secret;
pub mod lease;
pub mod lease_event;

pub use dynamic_secret::{DynamicSecretRepository, SqlxDynamicSecretRepository};
pub use lease::{LeaseRepository, LeaseTransition, SqlxLeaseRepository};
pub use lease_event::{LeaseEventRepository, SqlxLeaseEventRepository};
