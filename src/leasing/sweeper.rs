//! Background expiry sweeper.
//!
//! Periodically expires leases whose TTL has elapsed. Each pass is bounded by
//! the configured batch size; anything left over is picked up on the next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

use super::manager::LeaseLifecycleManager;
use crate::config::LeasingConfig;
use crate::errors::Result;
use crate::observability::MetricsRecorder;

pub struct ExpirySweeper {
    manager: Arc<LeaseLifecycleManager>,
    interval: Duration,
    batch_size: u32,
    metrics: MetricsRecorder,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<LeaseLifecycleManager>, config: &LeasingConfig) -> Self {
        Self {
            manager,
            interval: config.sweep_interval(),
            batch_size: config.sweep_batch_size.max(1),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Run a single pass and return how many leases were expired
    pub async fn sweep(&self) -> Result<usize> {
        let expired = self
            .manager
            .expire_lapsed(self.batch_size)
            .instrument(crate::lease_span!("sweep", batch_size = self.batch_size))
            .await?;
        self.metrics.record_sweep(expired);
        if expired > 0 {
            info!(expired, "Expiry sweep completed");
        } else {
            debug!("Expiry sweep found nothing to expire");
        }
        Ok(expired)
    }

    /// Sweep on a fixed interval until `shutdown` is cancelled.
    ///
    /// A pass in progress always finishes before the task exits.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_seconds = self.interval.as_secs(),
                batch_size = self.batch_size,
                "Expiry sweeper started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            error!(error = %e, "Expiry sweep failed");
                        }
                    }
                }
            }

            info!("Expiry sweeper stopped");
        })
    }
}
