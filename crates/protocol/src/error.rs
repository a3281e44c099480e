//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown operation tag: {0:#04x}")]
    UnknownOperation(u8),

    #[error("Unknown event tag: {0:#04x}")]
    UnknownEvent(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Frame length mismatch: header says {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Trailing bytes after payload: {0}")]
    TrailingBytes(usize),

    #[error("Invalid UTF-8 string")]
    InvalidString,
}
