//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the breaker registry and backup manager from validated config
//! - Start background tasks (scheduler, admin API)
//! - Wait for a stop signal, then broadcast shutdown and drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Every background task holds a shutdown receiver until it exits, which
//!   is what `Shutdown::drain` waits on

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::backup::{BackupManager, BackupScheduler, DatabaseTool, DATABASE_BREAKER};
use crate::config::OpsConfig;
use crate::lifecycle::{signals, Shutdown};
use crate::resilience::CircuitBreakerRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind admin API on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// The long-lived objects shared by every task.
pub struct Services {
    pub config: OpsConfig,
    pub registry: Arc<CircuitBreakerRegistry>,
    pub manager: Arc<BackupManager>,
}

impl Services {
    /// Services backed by the configured dump/restore programs.
    pub fn from_config(config: OpsConfig) -> Self {
        let manager = Arc::new(BackupManager::from_config(config.backup.clone()));
        Self::assemble(config, manager)
    }

    /// Services with an injected database collaborator.
    pub fn with_tool(config: OpsConfig, tool: Arc<dyn DatabaseTool>) -> Self {
        let manager = Arc::new(BackupManager::new(config.backup.clone(), tool));
        Self::assemble(config, manager)
    }

    fn assemble(config: OpsConfig, manager: Arc<BackupManager>) -> Self {
        let registry = Arc::new(CircuitBreakerRegistry::from_config(&config));
        // Created eagerly so it shows up in status output before the first backup.
        registry.get_or_create(DATABASE_BREAKER);
        Self {
            config,
            registry,
            manager,
        }
    }

    pub fn scheduler(&self) -> BackupScheduler {
        BackupScheduler::new(
            self.manager.clone(),
            self.registry.get_or_create(DATABASE_BREAKER),
            self.config.scheduler.clone(),
        )
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState::new(self.registry.clone(), self.manager.clone(), &self.config.admin.api_key)
    }
}

/// Start the metrics exporter if enabled. Validation already checked the address.
pub fn start_metrics(config: &OpsConfig) {
    if !config.observability.metrics_enabled {
        return;
    }
    match config.observability.metrics_address.parse::<SocketAddr>() {
        Ok(addr) => crate::observability::metrics::init_metrics(addr),
        Err(e) => tracing::error!(
            metrics_address = %config.observability.metrics_address,
            error = %e,
            "Failed to parse metrics address"
        ),
    }
}

/// Bind and serve the admin API until shutdown.
pub async fn spawn_admin(services: &Services, shutdown: &Shutdown) -> Result<Option<JoinHandle<()>>, StartupError> {
    let admin = &services.config.admin;
    if !admin.enabled {
        tracing::info!("Admin API disabled");
        return Ok(None);
    }

    let listener = TcpListener::bind(&admin.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: admin.bind_address.clone(),
            source,
        })?;
    let router = setup_admin_router(
        services.admin_state(),
        Duration::from_secs(admin.request_timeout_secs),
    );
    tracing::info!(address = %admin.bind_address, "Admin API listening");

    let mut stop = shutdown.subscribe();
    let running = shutdown.subscribe();
    Ok(Some(tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Admin API server failed");
        }
        tracing::info!("Admin API stopped");
        drop(running);
    })))
}

/// Run the daemon until SIGINT/SIGTERM.
pub async fn run(config: OpsConfig) -> Result<(), StartupError> {
    let grace = Duration::from_secs(config.shutdown.grace_period_secs);
    start_metrics(&config);

    let services = Services::from_config(config);
    let shutdown = Shutdown::new();

    tracing::info!(
        backup_path = %services.manager.backup_dir().display(),
        retention_days = services.config.backup.retention_days,
        compression = services.config.backup.compression_enabled,
        encryption = services.config.backup.encryption_key.is_some(),
        "Services initialized"
    );

    tokio::spawn(services.scheduler().run(shutdown.subscribe()));
    spawn_admin(&services, &shutdown).await?;

    signals::wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();
    shutdown.drain(grace).await;
    Ok(())
}
