//! Frame definitions for the galaxy protocol.
//!
//! Every frame is `u32 length | u8 tag | body`, where `length` counts the tag
//! and the body. Client frames carry an [`Operation`], server frames an
//! [`Event`].

mod client;
mod server;

pub use client::*;
pub use server::*;

use crate::{BinaryReader, BinaryWriter, ProtocolError};
use bytes::Bytes;

/// Size of the length header in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Tags for client -> server operations.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Join = 0x01,
    Leave = 0x02,
    Move = 0x03,
    EatPlayer = 0x04,
    EatFood = 0x05,
    Pause = 0x06,
}

impl TryFrom<u8> for OperationType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0x01 => Self::Join,
            0x02 => Self::Leave,
            0x03 => Self::Move,
            0x04 => Self::EatPlayer,
            0x05 => Self::EatFood,
            0x06 => Self::Pause,
            other => return Err(ProtocolError::UnknownOperation(other)),
        })
    }
}

/// Tags for server -> client events.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Joined = 0x01,
    NewFood = 0x02,
    NewPlayer = 0x03,
    PlayerMove = 0x04,
    PlayerGrow = 0x05,
    DestroyFood = 0x06,
    DestroyPlayer = 0x07,
    Pause = 0x08,
}

impl TryFrom<u8> for EventType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0x01 => Self::Joined,
            0x02 => Self::NewFood,
            0x03 => Self::NewPlayer,
            0x04 => Self::PlayerMove,
            0x05 => Self::PlayerGrow,
            0x06 => Self::DestroyFood,
            0x07 => Self::DestroyPlayer,
            0x08 => Self::Pause,
            other => return Err(ProtocolError::UnknownEvent(other)),
        })
    }
}

/// Start a frame with a placeholder length and the given tag.
fn begin_frame(tag: u8, body_hint: usize) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(FRAME_HEADER_LEN + 1 + body_hint);
    w.put_u32(0);
    w.put_u8(tag);
    w
}

/// Patch the length header and freeze the frame.
fn end_frame(w: BinaryWriter) -> Bytes {
    let len = (w.len() - FRAME_HEADER_LEN) as u32;
    let mut out = w.finish().to_vec();
    out[..FRAME_HEADER_LEN].copy_from_slice(&len.to_le_bytes());
    Bytes::from(out)
}

/// Validate the length header and return a reader positioned at the tag.
fn open_frame(data: &[u8]) -> Result<BinaryReader, ProtocolError> {
    if data.len() < FRAME_HEADER_LEN + 1 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let mut reader = BinaryReader::new(Bytes::copy_from_slice(data));
    let declared = reader.get_u32()? as usize;
    let actual = reader.remaining();
    if declared != actual {
        return Err(ProtocolError::LengthMismatch { declared, actual });
    }
    Ok(reader)
}
