//! Wire protocol for tally replies.
//!
//! Requests are plain newline-terminated text lines; the exact line `EXIT`
//! asks the server to end the session. Replies are CRLF-framed text:
//! - `COUNT <characters> <digits>` carries the tally for one request line
//! - `END` is the final frame of a session; the server closes afterwards
//!
//! Frames are single lines so they stay self-delimiting over a TCP stream,
//! which has no message boundaries of its own.

use bytes::BytesMut;
use thiserror::Error;

/// Request line that asks the server to end the session (case-sensitive).
pub const EXIT_LINE: &str = "EXIT";

const REPLY_TAG: &str = "COUNT";
const END_TAG: &str = "END";

/// Tally computed from one request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Total characters in the line, excluding the line terminator.
    pub character_count: usize,
    /// How many of those characters are ASCII decimal digits.
    pub digit_count: usize,
}

impl Reply {
    /// Tally `line`: total characters, plus how many are ASCII digits.
    pub fn for_line(line: &str) -> Self {
        Self {
            character_count: line.chars().count(),
            digit_count: line.chars().filter(char::is_ascii_digit).count(),
        }
    }
}

/// One server-to-client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Tally for one request line.
    Reply(Reply),
    /// End of session; no further frames follow.
    End,
}

/// Errors from decoding a reply frame.
///
/// All of these are fatal to the connection they occur on; frames are never
/// re-read or retried.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame line was empty.
    #[error("empty reply frame")]
    Empty,
    /// The frame did not start with a known tag.
    #[error("unknown frame tag in {0:?}")]
    UnknownTag(String),
    /// The frame tag was known but the counts were missing or not numeric.
    #[error("malformed count frame {0:?}")]
    Malformed(String),
}

impl Frame {
    /// Encode the frame as one CRLF-terminated line.
    pub fn encode(&self) -> BytesMut {
        let mut frame = BytesMut::with_capacity(32);
        match self {
            Frame::Reply(reply) => frame.extend_from_slice(
                format!(
                    "{REPLY_TAG} {} {}\r\n",
                    reply.character_count, reply.digit_count
                )
                .as_bytes(),
            ),
            Frame::End => {
                frame.extend_from_slice(END_TAG.as_bytes());
                frame.extend_from_slice(b"\r\n");
            }
        }
        frame
    }

    /// Decode one frame from a line read off the wire.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        let frame = trim_line_ending(line);

        if frame.is_empty() {
            return Err(FrameError::Empty);
        }
        if frame == END_TAG {
            return Ok(Frame::End);
        }

        let mut fields = frame.split(' ');
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(REPLY_TAG), Some(characters), Some(digits), None) => {
                let character_count = characters
                    .parse()
                    .map_err(|_| FrameError::Malformed(frame.to_string()))?;
                let digit_count = digits
                    .parse()
                    .map_err(|_| FrameError::Malformed(frame.to_string()))?;
                Ok(Frame::Reply(Reply {
                    character_count,
                    digit_count,
                }))
            }
            (Some(REPLY_TAG), ..) => Err(FrameError::Malformed(frame.to_string())),
            _ => Err(FrameError::UnknownTag(frame.to_string())),
        }
    }
}

/// Strip one trailing `\n` (and a preceding `\r`, if any) from a line.
///
/// Only the line terminator is removed; leading, trailing, and interior
/// whitespace is part of the text being tallied.
pub fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
