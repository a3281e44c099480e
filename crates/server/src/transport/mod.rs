//! Outbound delivery to clients.
//!
//! The world only ever talks to a [`Transport`]: a non-blocking frame sink
//! that can be closed. [`Connection`] is the WebSocket implementation.

mod connection;

pub use connection::{Connection, ConnectionPump};

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Why a frame could not be enqueued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    /// The outbound queue was at capacity; the connection has been closed.
    #[error("send queue full")]
    Full,
}

/// A sink for encoded frames.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Enqueue without blocking.
    fn send_binary(&self, frame: Bytes) -> Result<(), SendError>;

    /// Tear the transport down. Safe to call any number of times.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
