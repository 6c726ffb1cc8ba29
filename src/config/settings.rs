//! # Configuration Settings
//!
//! Defines the configuration structure for the leasekeeper engine.

use crate::errors::{LeaseError, Result};
use crate::utils::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Lease policy, sweeper and retry settings
    #[validate(nested)]
    pub leasing: LeasingConfig,

    /// Credential provider settings
    #[validate(nested)]
    pub providers: ProviderConfig,
}

impl AppConfig {
    /// Build configuration from environment variables only
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
            leasing: LeasingConfig::from_env(),
            providers: ProviderConfig::from_env(),
        }
    }

    /// Load a TOML/YAML/JSON file, with `LEASEKEEPER__SECTION__KEY` variables layered on top
    pub fn from_file(path: &str) -> Result<Self> {
        let loaded: AppConfig = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LEASEKEEPER").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(loaded)
    }

    /// `LEASEKEEPER_CONFIG_FILE` if set, otherwise plain environment variables
    pub fn load() -> Result<Self> {
        let config = match std::env::var("LEASEKEEPER_CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(LeaseError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(LeaseError::validation("Database URL must start with 'sqlite:'"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(LeaseError::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        // A provider call that outlives many sweep periods would stall expiry
        if self.leasing.provider_timeout_seconds >= self.leasing.sweep_interval_seconds * 10 {
            return Err(LeaseError::validation(
                "provider timeout must be shorter than ten sweep intervals",
            ));
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be at most 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/leasekeeper.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_seconds: env_parse(
                "DATABASE_CONNECT_TIMEOUT_SECONDS",
                defaults.connect_timeout_seconds,
            ),
            idle_timeout_seconds: env_parse(
                "DATABASE_IDLE_TIMEOUT_SECONDS",
                defaults.idle_timeout_seconds,
            ),
            auto_migrate: env_flag("DATABASE_AUTO_MIGRATE", defaults.auto_migrate),
        }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics exporter
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to startup logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "leasekeeper".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if !self.enable_metrics || self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enable_metrics: env_flag("LEASEKEEPER_ENABLE_METRICS", defaults.enable_metrics),
            metrics_port: env_parse("LEASEKEEPER_METRICS_PORT", defaults.metrics_port),
            service_name: std::env::var("LEASEKEEPER_SERVICE_NAME")
                .unwrap_or(defaults.service_name),
            log_level: std::env::var("LEASEKEEPER_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_flag("LEASEKEEPER_JSON_LOGGING", defaults.json_logging),
        }
    }
}

/// Lease policy, sweeper cadence and retry budget
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LeasingConfig {
    /// Requested TTLs must be strictly greater than this
    #[validate(range(min = 1, message = "Minimum lease TTL must be positive"))]
    pub minimum_lease_ttl_seconds: u64,

    /// Interval between background expiry sweeps
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Sweep interval must be between 1 and 3600 seconds"
    ))]
    pub sweep_interval_seconds: u64,

    /// Upper bound on leases examined per sweep
    #[validate(range(min = 1, max = 100000, message = "Sweep batch size must be positive"))]
    pub sweep_batch_size: u32,

    /// Bound on every provider issue/revoke call
    #[validate(range(
        min = 1,
        max = 300,
        message = "Provider timeout must be between 1 and 300 seconds"
    ))]
    pub provider_timeout_seconds: u64,

    /// Attempts for retryable provider failures
    #[validate(range(min = 1, max = 10, message = "Provider attempts must be between 1 and 10"))]
    pub provider_max_attempts: u32,

    pub provider_initial_backoff_ms: u64,

    pub provider_max_backoff_ms: u64,

    /// Attempts for transient storage failures
    #[validate(range(min = 1, max = 10, message = "Storage attempts must be between 1 and 10"))]
    pub storage_max_attempts: u32,
}

impl Default for LeasingConfig {
    fn default() -> Self {
        Self {
            minimum_lease_ttl_seconds: 60,
            sweep_interval_seconds: 30,
            sweep_batch_size: 500,
            provider_timeout_seconds: 15,
            provider_max_attempts: 3,
            provider_initial_backoff_ms: 200,
            provider_max_backoff_ms: 5_000,
            storage_max_attempts: 3,
        }
    }
}

impl LeasingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn provider_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.provider_max_attempts,
            initial_backoff: Duration::from_millis(self.provider_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.provider_max_backoff_ms),
            backoff_multiplier: 2.0,
        }
    }

    pub fn storage_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.storage_max_attempts,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            minimum_lease_ttl_seconds: env_parse(
                "LEASEKEEPER_MINIMUM_LEASE_TTL_SECONDS",
                defaults.minimum_lease_ttl_seconds,
            ),
            sweep_interval_seconds: env_parse(
                "LEASEKEEPER_SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval_seconds,
            ),
            sweep_batch_size: env_parse("LEASEKEEPER_SWEEP_BATCH_SIZE", defaults.sweep_batch_size),
            provider_timeout_seconds: env_parse(
                "LEASEKEEPER_PROVIDER_TIMEOUT_SECONDS",
                defaults.provider_timeout_seconds,
            ),
            provider_max_attempts: env_parse(
                "LEASEKEEPER_PROVIDER_MAX_ATTEMPTS",
                defaults.provider_max_attempts,
            ),
            provider_initial_backoff_ms: env_parse(
                "LEASEKEEPER_PROVIDER_INITIAL_BACKOFF_MS",
                defaults.provider_initial_backoff_ms,
            ),
            provider_max_backoff_ms: env_parse(
                "LEASEKEEPER_PROVIDER_MAX_BACKOFF_MS",
                defaults.provider_max_backoff_ms,
            ),
            storage_max_attempts: env_parse(
                "LEASEKEEPER_STORAGE_MAX_ATTEMPTS",
                defaults.storage_max_attempts,
            ),
        }
    }
}

/// Credential provider settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProviderConfig {
    /// Register the static development provider instead of real cloud providers
    pub use_mock_provider: bool,

    /// Prefix for provider authentication variables (`<PREFIX>__<REF>__<FIELD>`)
    #[validate(length(min = 1, message = "Authentication prefix cannot be empty"))]
    pub auth_env_prefix: String,

    /// Region used when neither the secret nor its authentication names one
    pub aws_default_region: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            use_mock_provider: false,
            auth_env_prefix: "LEASEKEEPER_AUTH".to_string(),
            aws_default_region: None,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_mock_provider: env_flag("LEASEKEEPER_USE_MOCK_PROVIDER", defaults.use_mock_provider),
            auth_env_prefix: std::env::var("LEASEKEEPER_AUTH_ENV_PREFIX")
                .unwrap_or(defaults.auth_env_prefix),
            aws_default_region: std::env::var("LEASEKEEPER_AWS_DEFAULT_REGION").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
        .unwrap_or(default)
}
