//! Per-connection request loop.
//!
//! Each accepted connection is served end-to-end by one handler: read a
//! line, tally it, write the reply frame, repeat. The handler owns its
//! connection exclusively; nothing it does can reach the listener or any
//! other connection.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::protocol::{trim_line_ending, Frame, Reply, EXIT_LINE};

const MAX_LINE_LENGTH: usize = 1024;

/// Why a connection's request loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent the exit line; the end frame was written back.
    Exit,
    /// Client closed its end without the exit line; nothing was written.
    Eof,
}

/// Serve one connection until the client exits, disconnects, or errors.
///
/// Every request line gets exactly one reply frame; the exit line gets the
/// end frame and stops the loop. I/O errors (including request lines that
/// are not valid UTF-8) propagate to the caller and are fatal to this
/// connection only. The stream is dropped, and with it the connection
/// closed, on every exit path.
pub async fn serve_connection<S>(stream: S) -> io::Result<CloseReason>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = String::with_capacity(MAX_LINE_LENGTH);

    loop {
        line.clear();

        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            // EOF
            return Ok(CloseReason::Eof);
        }

        let request = trim_line_ending(&line);

        if request == EXIT_LINE {
            writer.write_all(&Frame::End.encode()).await?;
            return Ok(CloseReason::Exit);
        }

        let reply = Reply::for_line(request);
        trace!(
            characters = reply.character_count,
            digits = reply.digit_count,
            "Replying"
        );
        writer.write_all(&Frame::Reply(reply).encode()).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_exit_line_gets_end_frame() {
        let stream = Builder::new().read(b"EXIT\n").write(b"END\r\n").build();
        let reason = serve_connection(stream).await.unwrap();
        assert_eq!(reason, CloseReason::Exit);
    }

    #[tokio::test]
    async fn test_reply_per_line_until_exit() {
        let stream = Builder::new()
            .read(b"abc123\n")
            .write(b"COUNT 6 3\r\n")
            .read(b"   \n")
            .write(b"COUNT 3 0\r\n")
            .read(b"EXIT\n")
            .write(b"END\r\n")
            .build();
        let reason = serve_connection(stream).await.unwrap();
        assert_eq!(reason, CloseReason::Exit);
    }

    #[tokio::test]
    async fn test_crlf_terminator_is_stripped() {
        let stream = Builder::new()
            .read(b"abc123\r\n")
            .write(b"COUNT 6 3\r\n")
            .read(b"EXIT\r\n")
            .write(b"END\r\n")
            .build();
        serve_connection(stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_line_is_still_tallied() {
        let stream = Builder::new()
            .read(b"\n")
            .write(b"COUNT 0 0\r\n")
            .read(b"EXIT\n")
            .write(b"END\r\n")
            .build();
        serve_connection(stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_is_case_sensitive() {
        let stream = Builder::new()
            .read(b"exit\n")
            .write(b"COUNT 4 0\r\n")
            .read(b"EXIT\n")
            .write(b"END\r\n")
            .build();
        serve_connection(stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_eof_closes_without_a_frame() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let reason = serve_connection(server).await.unwrap();
        assert_eq!(reason, CloseReason::Eof);
    }

    #[tokio::test]
    async fn test_replies_then_peer_disconnects() {
        let (client, server) = tokio::io::duplex(256);
        let handler = tokio::spawn(serve_connection(server));
        let (client_read, mut client_write) = tokio::io::split(client);
        let mut replies = BufReader::new(client_read);
        let mut line = String::new();

        client_write.write_all(b"hello7\n").await.unwrap();
        replies.read_line(&mut line).await.unwrap();
        assert_eq!(line, "COUNT 6 1\r\n");

        client_write.shutdown().await.unwrap();
        let reason = handler.await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::Eof);
    }

    #[tokio::test]
    async fn test_connection_closes_after_end_frame() {
        let (client, server) = tokio::io::duplex(256);
        let handler = tokio::spawn(serve_connection(server));
        let (mut client_read, mut client_write) = tokio::io::split(client);

        client_write.write_all(b"EXIT\n").await.unwrap();
        let mut reply = vec![0u8; 16];
        let n = client_read.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"END\r\n");

        // The handler is done and its half of the stream dropped
        assert_eq!(handler.await.unwrap().unwrap(), CloseReason::Exit);
        assert_eq!(client_read.read(&mut reply).await.unwrap(), 0);
    }
}
