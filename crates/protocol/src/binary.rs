//! Binary reading and writing utilities for the galaxy protocol.
//!
//! All integers are little-endian. Strings carry a `u16` length prefix,
//! optional values a one-byte presence flag.

use crate::{Color, PlayerId, ProtocolError, Vector2D};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A reader for parsing binary protocol messages.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            Err(ProtocolError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.get_u8()? != 0)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.get_u16()? as usize;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidString)
    }

    pub fn get_vector(&mut self) -> Result<Vector2D, ProtocolError> {
        let x = self.get_u32()?;
        let y = self.get_u32()?;
        Ok(Vector2D::new(x, y))
    }

    pub fn get_color(&mut self) -> Result<Color, ProtocolError> {
        self.ensure(3)?;
        Ok(Color::new(self.buf.get_u8(), self.buf.get_u8(), self.buf.get_u8()))
    }

    pub fn get_player_id(&mut self) -> Result<PlayerId, ProtocolError> {
        self.ensure(16)?;
        let mut raw = [0u8; 16];
        self.buf.copy_to_slice(&mut raw);
        Ok(PlayerId::from_bytes(raw))
    }

    pub fn get_optional_string(&mut self) -> Result<Option<String>, ProtocolError> {
        if self.get_bool()? {
            self.get_string().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn get_optional_u32(&mut self) -> Result<Option<u32>, ProtocolError> {
        if self.get_bool()? {
            self.get_u32().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Fails if any bytes were left unread.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// A writer for building binary protocol messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    #[inline]
    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    /// Write a length-prefixed UTF-8 string, truncated to `u16::MAX` bytes
    /// on a character boundary.
    pub fn put_string(&mut self, s: &str) {
        let mut end = s.len().min(u16::MAX as usize);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.put_u16_le(end as u16);
        self.buf.put_slice(&s.as_bytes()[..end]);
    }

    pub fn put_vector(&mut self, v: Vector2D) {
        self.buf.put_u32_le(v.x);
        self.buf.put_u32_le(v.y);
    }

    pub fn put_color(&mut self, c: Color) {
        self.buf.put_slice(&[c.r, c.g, c.b]);
    }

    pub fn put_player_id(&mut self, id: &PlayerId) {
        self.buf.put_slice(id.as_bytes());
    }

    pub fn put_optional_string(&mut self, s: Option<&str>) {
        self.put_bool(s.is_some());
        if let Some(s) = s {
            self.put_string(s);
        }
    }

    pub fn put_optional_u32(&mut self, v: Option<u32>) {
        self.put_bool(v.is_some());
        if let Some(v) = v {
            self.put_u32(v);
        }
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Get current buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
