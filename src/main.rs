//! CRM operations daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────┐
//!   │                          crm-ops                            │
//!   │                                                             │
//!   │  ┌───────────┐   tick   ┌──────────────┐   ┌────────────┐  │
//!   │  │ scheduler │─────────▶│   database   │──▶│   backup   │──┼──▶ pg_dump / psql
//!   │  └───────────┘          │   breaker    │   │  manager   │  │
//!   │                         └──────────────┘   └─────┬──────┘  │
//!   │  ┌───────────┐                 ▲                 │         │
//!   │  │ admin API │─────────────────┘                 ▼         │
//!   │  └───────────┘                           backup directory  │
//!   │                                          <id>.sql[.gz][.enc]│
//!   │  ┌──────────────────────────────────────────────────────┐  │
//!   │  │ config · logging · metrics · shutdown coordination   │  │
//!   │  └──────────────────────────────────────────────────────┘  │
//!   └────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use crm_ops::config::loader::load_config;
use crm_ops::lifecycle::startup;
use crm_ops::observability::logging;

#[derive(Parser)]
#[command(name = "crm-ops", version, about = "Scheduled database backups with circuit-breaker protection")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "crm-ops.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init(&config.observability)?;

    tracing::info!(
        version = crm_ops::VERSION,
        config = %args.config.display(),
        "crm-ops starting"
    );

    if args.check {
        tracing::info!("Configuration valid");
        return Ok(());
    }

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
