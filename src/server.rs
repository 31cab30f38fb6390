//! TCP listener and dispatch loop.
//!
//! Accepts connections and hands each one to the worker pool, going
//! straight back to `accept` without waiting on handler work. The loop ends
//! on a shutdown signal (clean) or an accept failure (an error); both paths
//! drain the pool before the listening socket is closed.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::connection::serve_connection;
use crate::pool::{DrainOutcome, WorkerPool};

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration, rejected before any socket is opened.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The listening socket could not be created.
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    /// `accept` failed while listening; the server drained and shut down.
    #[error("failed to accept connection: {0}")]
    Accept(io::Error),
}

/// A bound tally server, ready to accept connections.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
}

impl Server {
    /// Validate the configuration and bind the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port))
            .await
            .map_err(|source| ServerError::Bind {
                port: config.port,
                source,
            })?;

        Ok(Self { config, listener })
    }

    #[cfg(test)]
    fn with_listener(config: ServerConfig, listener: TcpListener) -> Self {
        Self { config, listener }
    }

    /// Address the listening socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and dispatch connections until a shutdown signal or an accept
    /// failure.
    ///
    /// Each accepted connection becomes one pool job for its whole
    /// lifetime, so the pool size is the maximum number of connections
    /// served at once; further connections queue for a free worker. A
    /// failed `accept` drains the pool, closes the socket, and returns the
    /// error; Ctrl-C does the same but returns cleanly.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self { config, listener } = self;

        info!(
            port = config.port,
            pool_size = config.pool_size,
            "Server listening"
        );

        let pool = WorkerPool::new(config.pool_size);
        let drain_timeout = Duration::from_secs(config.drain_timeout);

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");
                        let job = async move {
                            match serve_connection(stream).await {
                                Ok(reason) => debug!(peer = %peer, ?reason, "Connection closed"),
                                Err(error) => warn!(peer = %peer, %error, "Connection error"),
                            }
                        };
                        if let Err(error) = pool.submit(job) {
                            error!(peer = %peer, %error, "Dropping connection");
                        }
                    }
                    Err(error) => {
                        error!(%error, "Failed to accept connection, shutting down");
                        break Err(ServerError::Accept(error));
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received, draining worker pool");
                    break Ok(());
                }
            }
        };

        drain_pool(pool, drain_timeout).await;
        // Dropping the listener closes the listening socket, after the drain
        drop(listener);
        result
    }
}

/// Run the pool's two-phase shutdown and log how it went.
async fn drain_pool(pool: WorkerPool, drain_timeout: Duration) {
    match pool.shutdown(drain_timeout).await {
        DrainOutcome::Drained => info!("Worker pool drained"),
        DrainOutcome::Cancelled => warn!("Worker pool force-cancelled in-flight connections"),
        DrainOutcome::TimedOut => error!("Worker pool did not terminate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EXIT_LINE;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn test_config(pool_size: usize) -> ServerConfig {
        ServerConfig {
            port: 0,
            pool_size,
            drain_timeout: 1,
            log_level: "info".to_string(),
        }
    }

    async fn spawn_server(pool_size: usize) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::with_listener(test_config(pool_size), listener);
        tokio::spawn(server.run());
        addr
    }

    struct TallyClient {
        replies: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TallyClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                replies: BufReader::new(reader),
                writer,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        /// Read one reply line, trimmed; an empty string means EOF.
        async fn read_reply(&mut self) -> String {
            let mut line = String::new();
            let n = self.replies.read_line(&mut line).await.unwrap();
            if n == 0 {
                return String::new();
            }
            line.trim_end().to_string()
        }

        async fn request(&mut self, line: &str) -> String {
            self.send(line).await;
            self.read_reply().await
        }
    }

    #[tokio::test]
    async fn test_tally_session_end_to_end() {
        let addr = spawn_server(2).await;
        let mut client = TallyClient::connect(addr).await;

        assert_eq!(client.request("abc123").await, "COUNT 6 3");
        assert_eq!(client.request("   ").await, "COUNT 3 0");
        assert_eq!(client.request("").await, "COUNT 0 0");
        assert_eq!(client.request(EXIT_LINE).await, "END");
        // Nothing is served after the end frame; the server closes the stream
        assert_eq!(client.read_reply().await, "");
    }

    #[tokio::test]
    async fn test_pool_caps_concurrently_served_connections() {
        let addr = spawn_server(1).await;

        let mut first = TallyClient::connect(addr).await;
        assert_eq!(first.request("first").await, "COUNT 5 0");

        // The lone worker is held by the first connection for its whole
        // lifetime, so the second connection's request sits in the queue.
        let mut second = TallyClient::connect(addr).await;
        second.send("second").await;
        let waiting = timeout(Duration::from_millis(200), second.read_reply()).await;
        assert!(waiting.is_err());

        assert_eq!(first.request(EXIT_LINE).await, "END");

        // Slot freed: the queued connection is served now
        let reply = timeout(Duration::from_secs(2), second.read_reply())
            .await
            .unwrap();
        assert_eq!(reply, "COUNT 6 0");
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_is_isolated() {
        let addr = spawn_server(2).await;

        let mut dropped = TallyClient::connect(addr).await;
        let mut survivor = TallyClient::connect(addr).await;
        assert_eq!(dropped.request("abc123").await, "COUNT 6 3");
        assert_eq!(survivor.request("hello7").await, "COUNT 6 1");

        // No exit line: the server sees a bare EOF on this connection only
        drop(dropped);

        assert_eq!(survivor.request("still here 1").await, "COUNT 12 1");

        // The dropped connection's worker slot is recycled for a new client
        let mut fresh = TallyClient::connect(addr).await;
        let reply = timeout(Duration::from_secs(2), fresh.request("99"))
            .await
            .unwrap();
        assert_eq!(reply, "COUNT 2 2");

        assert_eq!(survivor.request(EXIT_LINE).await, "END");
    }

    #[tokio::test]
    async fn test_bind_rejects_reserved_port() {
        let config = ServerConfig {
            port: 80,
            pool_size: 1,
            drain_timeout: 1,
            log_level: "info".to_string(),
        };
        let err = Server::bind(config).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Config(ConfigError::ReservedPort(80))
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_empty_pool() {
        let config = ServerConfig {
            port: 6100,
            pool_size: 0,
            drain_timeout: 1,
            log_level: "info".to_string(),
        };
        let err = Server::bind(config).await.unwrap_err();
        assert!(matches!(err, ServerError::Config(ConfigError::EmptyPool)));
    }
}
