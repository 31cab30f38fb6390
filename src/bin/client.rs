//! linetally client binary.
//!
//! Connects to a tally server and runs an interactive session: type a
//! line, get its character and digit counts back, type `EXIT` to quit. Run
//! with `<hostname> <port>`, or with no arguments for the defaults.

use linetally::client;
use linetally::config::ClientConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ClientConfig::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    debug!(
        hostname = %config.hostname,
        port = config.port,
        "Starting linetally client"
    );

    client::run(config).await?;
    Ok(())
}
