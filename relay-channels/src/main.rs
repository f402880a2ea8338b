//! Relay Channels - Main entry point.

use anyhow::Result;
use relay_channels::start_server;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from the environment
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay Channels v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP server
    start_server(&config).await
}
