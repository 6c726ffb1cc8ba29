//! # Leasekeeper
//!
//! A dynamic secret leasing engine. Administrators configure dynamic secrets
//! (for example an AWS IAM role); requesters lease short-lived credentials
//! against them, renew them, and revoke them early. Lapsed leases are expired
//! in the background, and every state change lands in an append-only audit log.
//!
//! ## Architecture
//!
//! ```text
//! DynamicSecretService ─┐
//!                       ├─> Lease store (SQLite) <─ ExpirySweeper
//! LeaseLifecycleManager ┘          ^
//!        │                         │
//!        ├─> TtlPolicy       EventRecorder
//!        └─> ProviderRegistry ─> CredentialProvider (AWS STS, static)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use leasekeeper::{config::AppConfig, startup::Engine, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load()?;
//!     let engine = Engine::build(&config).await?;
//!     let expired = engine.sweeper.sweep().await?;
//!     println!("expired {expired} leases");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod leasing;
pub mod observability;
pub mod providers;
pub mod startup;
pub mod storage;
pub mod utils;

pub use config::AppConfig;
pub use errors::{Error, LeaseError, Result};
pub use leasing::{
    CreateLeaseRequest, DynamicSecretService, ExpirySweeper, LeaseLifecycleManager, LeaseStores,
};
pub use startup::Engine;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
