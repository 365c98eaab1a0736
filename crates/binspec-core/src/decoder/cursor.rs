//! Byte cursor over an immutable buffer.

use crate::error::{Error, Result};
use crate::schema::ByteOrder;
use bytes::Bytes;

/// A read position into a shared, immutable buffer plus the active byte order.
///
/// Cloning is cheap (the buffer is reference-counted), which is how peeks are
/// done: [`Cursor::fork`] the cursor, read from the fork, drop it.
#[derive(Debug, Clone)]
pub struct Cursor {
    data: Bytes,
    offset: usize,
    byte_order: ByteOrder,
}

impl Cursor {
    /// Creates a cursor at offset 0
    pub fn new(data: impl Into<Bytes>, byte_order: ByteOrder) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            byte_order,
        }
    }

    /// Current absolute offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total buffer length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns true if nothing is left to read
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Active byte order
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Changes the active byte order
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Unread part of the buffer
    pub fn rest(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// An independent copy for non-consuming reads
    pub fn fork(&self) -> Cursor {
        self.clone()
    }

    /// Byte at the cursor, without consuming it
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    fn take(&mut self, n: usize) -> Result<Bytes> {
        if n > self.remaining() {
            return Err(Error::unexpected_eof(self.offset, n, self.remaining()));
        }
        let bytes = self.data.slice(self.offset..self.offset + n);
        self.offset += n;
        Ok(bytes)
    }

    /// Reads one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self
            .peek_u8()
            .ok_or_else(|| Error::unexpected_eof(self.offset, 1, 0))?;
        self.offset += 1;
        Ok(byte)
    }

    /// Reads an unsigned integer of `n` bytes (1..=8) in the active byte order
    pub fn read_uint(&mut self, n: usize) -> Result<u64> {
        if !(1..=8).contains(&n) {
            return Err(Error::invalid_schema(format!(
                "integer width must be 1..=8 bytes, got {}",
                n
            )));
        }
        let bytes = self.take(n)?;
        let value = match self.byte_order {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            ByteOrder::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        };
        Ok(value)
    }

    /// Reads a two's-complement signed integer of `n` bytes (1..=8)
    pub fn read_int(&mut self, n: usize) -> Result<i64> {
        let raw = self.read_uint(n)?;
        let unused = 64 - 8 * n as u32;
        Ok(((raw << unused) as i64) >> unused)
    }

    /// Reads `n` bytes as Latin-1 text, one char per byte
    pub fn read_ascii(&mut self, n: usize) -> Result<String> {
        Ok(latin1(&self.take(n)?))
    }

    /// Reads exactly `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.take(n)
    }

    /// Reads up to `n` bytes, fewer when the buffer ends first
    pub fn read_bytes_lenient(&mut self, n: usize) -> Bytes {
        let n = n.min(self.remaining());
        let bytes = self.data.slice(self.offset..self.offset + n);
        self.offset += n;
        bytes
    }

    /// Advances `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::unexpected_eof(self.offset, n, self.remaining()));
        }
        self.offset += n;
        Ok(())
    }

    /// Advances up to `n` bytes and returns how many were skipped
    pub fn skip_lenient(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        self.offset += n;
        n
    }

    /// Moves to an absolute offset within the buffer.
    ///
    /// Only bounded regions move backwards, when clamping an overrun.
    pub(crate) fn seek(&mut self, offset: usize) {
        self.offset = offset.min(self.data.len());
    }
}

/// Maps each byte to the char with the same code point
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
