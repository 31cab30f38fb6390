//! Interactive client session.
//!
//! Connects to a tally server, forwards lines typed by the user, and prints
//! the counts from each reply until the end-of-session frame arrives. All
//! failures are fatal to the client process; there is no retry or
//! reconnect.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{ClientConfig, ConfigError};
use crate::protocol::{Frame, FrameError, EXIT_LINE};

/// Fatal client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration, rejected before any connection attempt.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The server could not be reached.
    #[error("could not connect to {hostname}:{port}: {source}")]
    Connect {
        hostname: String,
        port: u16,
        source: io::Error,
    },
    /// I/O failed mid-session.
    #[error("session I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The server sent a frame the codec does not recognize.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The server closed the connection without sending the end frame.
    #[error("server closed the connection without ending the session")]
    Disconnected,
}

/// Connect to the configured server and run an interactive session on
/// stdin.
pub async fn run(config: ClientConfig) -> Result<(), ClientError> {
    config.validate()?;

    let stream = TcpStream::connect((config.hostname.as_str(), config.port))
        .await
        .map_err(|source| ClientError::Connect {
            hostname: config.hostname.clone(),
            port: config.port,
            source,
        })?;

    println!("Connected to {}:{}", config.hostname, config.port);
    run_session(BufReader::new(tokio::io::stdin()), stream).await
}

/// Drive one session: read user lines from `input`, exchange frames on
/// `stream`, print the counts.
///
/// Empty input lines are rejected locally without contacting the server.
/// End of `input` is treated as if the user had typed the exit line, so a
/// closed stdin still ends the session cleanly on the server side.
pub async fn run_session<I>(input: I, stream: TcpStream) -> Result<(), ClientError>
where
    I: AsyncBufRead + Unpin,
{
    let (reader, mut writer) = stream.into_split();
    let mut replies = BufReader::new(reader);
    let mut input = input.lines();
    let mut reply_line = String::with_capacity(64);

    loop {
        println!("Type a line to tally, or \"{EXIT_LINE}\" to quit");

        let request = match input.next_line().await? {
            Some(line) => line,
            None => EXIT_LINE.to_string(),
        };

        if request.is_empty() {
            println!("Please type a non-empty line");
            continue;
        }

        debug!(request = %request, "Sending line");
        writer.write_all(request.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        reply_line.clear();
        let n = replies.read_line(&mut reply_line).await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }

        match Frame::decode(&reply_line)? {
            Frame::Reply(reply) => {
                println!("Character count: {}", reply.character_count);
                println!("Digit count: {}", reply.digit_count);
            }
            Frame::End => {
                println!("Server ended the session, disconnecting");
                return Ok(());
            }
        }
    }
}
