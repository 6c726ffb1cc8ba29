//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//!
//! Credential material must never reach a log line: instrumented functions
//! skip credential arguments and providers log only identifiers.

use crate::config::ObservabilityConfig;
use crate::errors::{LeaseError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| LeaseError::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_span_list(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| LeaseError::config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Create a tracing span for a lease lifecycle operation.
///
/// ```rust,ignore
/// let span = lease_span!("renew", lease_id = %lease_id);
/// ```
#[macro_export]
macro_rules! lease_span {
    ($operation:expr) => {
        tracing::info_span!(
            "lease_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "lease_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        database_in_memory = config.database.is_in_memory(),
        minimum_lease_ttl_seconds = config.leasing.minimum_lease_ttl_seconds,
        sweep_interval_seconds = config.leasing.sweep_interval_seconds,
        provider_timeout_seconds = config.leasing.provider_timeout_seconds,
        mock_provider = config.providers.use_mock_provider,
        metrics_enabled = config.observability.enable_metrics,
        "Leasekeeper configuration"
    );
}
