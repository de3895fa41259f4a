//! # Overlay Controller
//!
//! Entry point for the controller daemon.
//!
//! 1. Load configuration (file, then environment)
//! 2. Install logging
//! 3. Bind the control sockets and register modules
//! 4. Start modules and wait for Ctrl+C
//! 5. Shut down gracefully

use anyhow::{Context, Result};
use controller_runtime::{init_logging, ControllerConfig, ControllerRuntime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logger).context("Failed to initialize logging")?;

    let runtime = ControllerRuntime::new(config).context("Failed to create controller")?;
    runtime.start().await.context("Controller startup failed")?;

    info!("Controller is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    runtime.shutdown().await;
    Ok(())
}
