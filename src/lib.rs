//! linetally: a line-tally client/server pair over plain TCP.
//!
//! The server replies to each newline-terminated text line with a frame
//! carrying the line's character and digit counts; the client forwards
//! lines typed by a user and prints the counts.
//!
//! Features:
//! - Bounded worker pool capping concurrently served connections
//! - CRLF-framed text replies with a distinguished end-of-session frame
//! - Two-phase drain of in-flight connections on shutdown
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod connection;
pub mod pool;
pub mod protocol;
pub mod server;
