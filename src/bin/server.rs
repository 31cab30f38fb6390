//! linetally server binary.
//!
//! Accepts TCP connections and replies to each text line with its character
//! and digit counts, bounding concurrent connections with a fixed worker
//! pool. Run with `<port> <pool_size>`, or with no arguments for the
//! defaults (a testing convenience).

use linetally::config::ServerConfig;
use linetally::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        port = config.port,
        pool_size = config.pool_size,
        drain_timeout = config.drain_timeout,
        "Starting linetally server"
    );

    let server = Server::bind(config).await?;
    server.run().await?;
    Ok(())
}
