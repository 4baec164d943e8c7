//! # Wallet Gate Runtime
//!
//! Serves the wallet gate over HTTP.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize logging (`LOG_LEVEL`, `LOG_FORMAT=json`)
//! 3. Validate configuration and build the service
//! 4. Serve until Ctrl+C, then drain in-flight requests

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wallet_gate::{GateConfig, GateService};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GateConfig::from_env().context("failed to read configuration")?;

    init_logging(&config)?;

    info!("===========================================");
    info!("  Wallet Gate v{}", wallet_gate::VERSION);
    info!("  Mode: {}", config.mode);
    info!("  Frontend: {}", config.cors.frontend_url);
    info!("===========================================");

    let service = GateService::from_config(config).context("invalid configuration")?;
    service
        .serve(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// `RUST_LOG` wins over `LOG_LEVEL` when set.
fn init_logging(config: &GateConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, initiating graceful shutdown");
}
