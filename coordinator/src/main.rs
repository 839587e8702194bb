//! FxWallet conversion engine binary.
//!
//! Runs the coordinator with its catalog refresh and offer sweep tasks until
//! Ctrl+C.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxwallet_coordinator::{ConversionCoordinator, CoordinatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CoordinatorConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting FxWallet coordinator");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(
        catalog_url = config.catalog.url.as_deref().unwrap_or("static"),
        persistent = config.ledger.database_url.is_some(),
        seed_balance = %config.ledger.seed_balance,
        "Configuration loaded"
    );

    let coordinator = ConversionCoordinator::from_config(config).await?;
    coordinator.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Err(e) = coordinator.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    let metrics = serde_json::to_string(&coordinator.metrics_snapshot())?;
    info!(metrics = %metrics, "Coordinator shutdown complete");
    Ok(())
}
