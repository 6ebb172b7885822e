//! # Expiry Sweeper
//!
//! Periodic background task that moves overdue `notified` invitations to
//! `expired`. It runs whether or not any requests are arriving.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::lifecycle::{InvitationLifecycleManager, SweepReport};
use crate::config::LifecycleSettings;
use crate::error::Result;
use crate::logging::log_error;

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    lifecycle: InvitationLifecycleManager,
    interval: Duration,
    batch_size: usize,
}

impl ExpirySweeper {
    pub fn new(lifecycle: InvitationLifecycleManager, interval: Duration, batch_size: usize) -> Self {
        Self {
            lifecycle,
            interval,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_settings(lifecycle: InvitationLifecycleManager, settings: &LifecycleSettings) -> Self {
        Self::new(
            lifecycle,
            settings.sweep_interval(),
            settings.sweep_batch_size,
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep cycle. Full batches are drained before returning so a
    /// backlog larger than `batch_size` clears in a single cycle.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let mut total = SweepReport::default();
        loop {
            let report = self.lifecycle.sweep_expired(self.batch_size).await?;
            total.scanned += report.scanned;
            total.expired += report.expired;
            total.skipped += report.skipped;

            // A batch where nothing moved would be rescanned forever
            if report.scanned < self.batch_size || report.expired == 0 {
                return Ok(total);
            }
        }
    }

    /// Start the sweep loop on the current runtime.
    pub fn spawn(self) -> ExpirySweeperHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let handle = tokio::spawn(async move {
            info!(
                interval_ms = self.interval.as_millis() as u64,
                batch_size = self.batch_size,
                "Starting expiry sweeper"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(report) if report.scanned > 0 => {
                                debug!(
                                    scanned = report.scanned,
                                    expired = report.expired,
                                    skipped = report.skipped,
                                    "Expiry sweep cycle finished"
                                );
                            }
                            Ok(_) => {}
                            Err(error) => {
                                // Keep sweeping; the next tick retries
                                log_error("ExpirySweeper", "run_once", &error.to_string(), None);
                            }
                        }
                    }
                }
            }
            info!("Expiry sweeper stopped");
        });

        ExpirySweeperHandle { shutdown, handle }
    }
}

/// Owner of a running sweeper task
#[derive(Debug)]
pub struct ExpirySweeperHandle {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ExpirySweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop after the current cycle and wait for the task to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(error) = self.handle.await {
            log_error("ExpirySweeper", "shutdown", &error.to_string(), None);
        }
    }
}
