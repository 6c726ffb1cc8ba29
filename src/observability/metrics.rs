//! # Metrics Collection
//!
//! Lease lifecycle counters exposed through the `metrics` facade, with an
//! optional Prometheus exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{LeaseError, Result};
use ::tracing::info;
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder for lease operations
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    pub fn record_lease_created(&self, provider: &str) {
        let labels = [("provider", provider.to_string())];
        counter!("leases_created_total", &labels).increment(1);
    }

    pub fn record_lease_renewed(&self, provider: &str) {
        let labels = [("provider", provider.to_string())];
        counter!("leases_renewed_total", &labels).increment(1);
    }

    pub fn record_lease_revoked(&self) {
        counter!("leases_revoked_total").increment(1);
    }

    pub fn record_lease_expired(&self) {
        counter!("leases_expired_total").increment(1);
    }

    /// Record a failed lifecycle operation with its stable error kind
    pub fn record_operation_failure(&self, operation: &str, kind: &str) {
        let labels = [("operation", operation.to_string()), ("kind", kind.to_string())];
        counter!("lease_operation_failures_total", &labels).increment(1);
    }

    /// Record a provider call outcome and its duration in seconds
    pub fn record_provider_call(&self, provider: &str, operation: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        let labels = [
            ("provider", provider.to_string()),
            ("operation", operation.to_string()),
            ("status", status.to_string()),
        ];
        counter!("provider_calls_total", &labels).increment(1);

        let duration_labels = [("provider", provider.to_string()), ("operation", operation.to_string())];
        histogram!("provider_call_duration_seconds", &duration_labels).record(duration);
    }

    pub fn record_sweep(&self, expired: usize) {
        gauge!("sweeper_last_run_expired").set(expired as f64);
        counter!("sweeper_runs_total").increment(1);
    }
}

fn describe_metrics() {
    describe_counter!("leases_created_total", "Leases issued");
    describe_counter!("leases_renewed_total", "Lease renewals");
    describe_counter!("leases_revoked_total", "Leases revoked by request");
    describe_counter!("leases_expired_total", "Leases expired by the sweeper or on read");
    describe_counter!("lease_operation_failures_total", "Failed lease operations by error kind");
    describe_counter!("provider_calls_total", "Credential provider calls");
    describe_histogram!(
        "provider_call_duration_seconds",
        ::metrics::Unit::Seconds,
        "Credential provider call latency"
    );
    describe_gauge!("sweeper_last_run_expired", "Leases expired in the most recent sweep");
    describe_counter!("sweeper_runs_total", "Completed expiry sweeps");
}

/// Install the Prometheus exporter when metrics are enabled
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(address) = config.metrics_bind_address() else {
        return Ok(());
    };

    let socket: SocketAddr = address
        .parse()
        .map_err(|e| LeaseError::config(format!("Invalid metrics address '{}': {}", address, e)))?;

    PrometheusBuilder::new().with_http_listener(socket).install().map_err(|e| {
        LeaseError::config_with_source("Failed to install Prometheus exporter", Box::new(e))
    })?;

    describe_metrics();
    info!(address = %socket, "Prometheus metrics exporter listening");
    Ok(())
}
