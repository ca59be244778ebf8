//! Shutdown coordination for the daemon.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
/// A task counts as running until it drops its receiver.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait until every subscriber has exited or `grace` runs out.
    ///
    /// Returns `true` when all tasks finished in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let remaining = self.receiver_count();
            if remaining == 0 {
                tracing::info!("All tasks drained");
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(remaining, grace_secs = grace.as_secs(), "Grace period elapsed with tasks still running");
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
