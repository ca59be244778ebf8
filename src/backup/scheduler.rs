//! Periodic backups.
//!
//! # Responsibilities
//! - Create a backup every `interval_secs`, the first one after one interval
//! - Route creation through the `database` circuit breaker
//! - Prune expired backups after each successful run
//!
//! A run already in progress finishes before a shutdown signal is observed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::backup::manager::BackupManager;
use crate::backup::metadata::BackupMetadata;
use crate::config::SchedulerConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerError};

/// Breaker name guarding database dumps.
pub const DATABASE_BREAKER: &str = "database";

pub struct BackupScheduler {
    manager: Arc<BackupManager>,
    breaker: Arc<CircuitBreaker>,
    config: SchedulerConfig,
}

impl BackupScheduler {
    pub fn new(manager: Arc<BackupManager>, breaker: Arc<CircuitBreaker>, config: SchedulerConfig) -> Self {
        Self {
            manager,
            breaker,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Scheduled backups disabled");
            return;
        }

        let period = Duration::from_secs(self.config.interval_secs.max(1));
        tracing::info!(
            interval_secs = period.as_secs(),
            cleanup = self.config.cleanup_after_backup,
            "Backup scheduler starting"
        );

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Backup scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One scheduled run. Failures are logged; the loop keeps going.
    pub async fn run_once(&self) -> Option<BackupMetadata> {
        let created = self.breaker.execute(|| self.manager.create_backup()).await;

        let metadata = match created {
            Ok(metadata) => metadata,
            Err(CircuitBreakerError::Open { name, retry_after }) => {
                tracing::warn!(
                    breaker = %name,
                    retry_after = ?retry_after,
                    "Skipping scheduled backup, circuit open"
                );
                return None;
            }
            Err(CircuitBreakerError::Inner(e)) => {
                tracing::error!(error = %e, "Scheduled backup failed");
                return None;
            }
        };

        if self.config.cleanup_after_backup {
            if let Err(e) = self.manager.cleanup_old_backups().await {
                tracing::warn!(error = %e, "Retention pass after scheduled backup failed");
            }
        }
        Some(metadata)
    }
}
