//! # Configuration Management
//!
//! Environment-first configuration with an optional file layer. Every section
//! has defaults suitable for local development.

pub mod settings;

pub use settings::{AppConfig, DatabaseConfig, LeasingConfig, ObservabilityConfig, ProviderConfig};
