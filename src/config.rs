//! Configuration for the linetally binaries.
//!
//! The server reads command-line arguments and an optional TOML file, with
//! CLI arguments taking precedence over config file values. The client is
//! CLI-only. Both validate before anything is bound or connected.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default port shared by server and client when no arguments are given.
pub const DEFAULT_PORT: u16 = 6100;
/// Default worker pool size for the server.
pub const DEFAULT_POOL_SIZE: usize = 5;
/// Default hostname for the client.
pub const DEFAULT_HOSTNAME: &str = "localhost";
/// Default seconds per shutdown drain phase.
pub const DEFAULT_DRAIN_TIMEOUT: u64 = 60;

/// Configuration errors, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Port at or below the reserved range.
    #[error("port {0} is in the reserved range; use a port above 1024")]
    ReservedPort(u16),
    /// Worker pool with no slots.
    #[error("worker pool size must be greater than zero")]
    EmptyPool,
    /// Client hostname left empty.
    #[error("hostname cannot be empty")]
    EmptyHostname,
    /// Config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML.
    #[error("failed to parse config file '{path}': {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command-line arguments for the tally server.
#[derive(Parser, Debug)]
#[command(name = "linetally-server")]
#[command(version)]
#[command(about = "A line-tally TCP server with a bounded worker pool", long_about = None)]
pub struct ServerCli {
    /// Port to listen on (must be above the reserved range)
    #[arg(requires = "pool_size")]
    pub port: Option<u16>,

    /// Number of worker slots for serving connections concurrently
    #[arg(requires = "port")]
    pub pool_size: Option<usize>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait per drain phase when shutting down
    #[arg(long)]
    pub drain_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration.
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Worker pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Seconds per shutdown drain phase.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            pool_size: default_pool_size(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_drain_timeout() -> u64 {
    DEFAULT_DRAIN_TIMEOUT
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub pool_size: usize,
    pub drain_timeout: u64,
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(ServerCli::parse())
    }

    /// Merge CLI args over config file values over defaults, then validate.
    pub fn resolve(cli: ServerCli) -> Result<Self, ConfigError> {
        let file = match cli.config {
            Some(ref path) => read_toml(path)?,
            None => TomlConfig::default(),
        };

        let config = merge(cli, file);
        config.validate()?;
        Ok(config)
    }

    /// Reject reserved ports and empty pools.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port <= 1024 {
            return Err(ConfigError::ReservedPort(self.port));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        Ok(())
    }
}

/// Merge CLI args with TOML config (CLI takes precedence).
fn merge(cli: ServerCli, file: TomlConfig) -> ServerConfig {
    ServerConfig {
        port: cli.port.unwrap_or(file.server.port),
        pool_size: cli.pool_size.unwrap_or(file.server.pool_size),
        drain_timeout: cli.drain_timeout.unwrap_or(file.server.drain_timeout),
        log_level: cli.log_level.unwrap_or(file.logging.level),
    }
}

fn read_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Command-line arguments for the tally client.
#[derive(Parser, Debug)]
#[command(name = "linetally-client")]
#[command(version)]
#[command(about = "Interactive client for the line-tally server", long_about = None)]
pub struct ClientCli {
    /// Hostname of the tally server
    #[arg(requires = "port")]
    pub hostname: Option<String>,

    /// Port the server listens on
    #[arg(requires = "hostname")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Final resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub hostname: String,
    pub port: u16,
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from CLI args.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(ClientCli::parse())
    }

    /// Fill in defaults for missing args, then validate.
    pub fn resolve(cli: ClientCli) -> Result<Self, ConfigError> {
        let config = ClientConfig {
            hostname: cli
                .hostname
                .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            port: cli.port.unwrap_or(DEFAULT_PORT),
            log_level: cli.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject empty hostnames and reserved ports.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.is_empty() {
            return Err(ConfigError::EmptyHostname);
        }
        if self.port <= 1024 {
            return Err(ConfigError::ReservedPort(self.port));
        }
        Ok(())
    }
}
