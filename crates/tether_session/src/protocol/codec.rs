//! # Frame Codec
//!
//! Little-endian primitive writer/reader used by every message record.
//!
//! ## Layout Rules
//!
//! - Integers and floats are little-endian
//! - Booleans are one byte, `0` or `1`; anything else is malformed
//! - Strings are a `u16` byte length followed by UTF-8
//! - Fixed-size records are copied as `Pod` bytes

use bytemuck::{bytes_of, Pod};

use crate::error::{CodecError, CodecResult};

/// Frame writer - appends fields to a growable buffer.
///
/// Reuse one writer across frames with [`MessageWriter::reset`] to keep the
/// allocation.
#[derive(Clone, Debug, Default)]
pub struct MessageWriter {
    buffer: Vec<u8>,
}

impl MessageWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Clears the buffer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the frame.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a bool as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::StringTooLong`] if the string does not fit a u16
    /// length prefix. Nothing is written in that case.
    pub fn write_str(&mut self, value: &str) -> CodecResult<()> {
        let len = u16::try_from(value.len()).map_err(|_| CodecError::StringTooLong(value.len()))?;
        self.write_u16(len);
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }
}

/// Frame reader - consumes fields from a borrowed buffer.
#[derive(Clone, Debug)]
pub struct MessageReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    /// Creates a reader over a frame.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Fails unless every byte has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingBytes`] if bytes remain.
    pub fn finish(&self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    fn take(&mut self, needed: usize) -> CodecResult<&'a [u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(CodecError::UnexpectedEnd { needed, remaining });
        }
        let slice = &self.buffer[self.position..self.position + needed];
        self.position += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a strict one-byte bool.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted or the byte is not 0/1.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted.
    #[inline]
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted.
    #[inline]
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted.
    #[inline]
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted.
    #[inline]
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted or the bytes are not UTF-8.
    pub fn read_string(&mut self) -> CodecResult<String> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads a Pod type directly.
    ///
    /// # Errors
    ///
    /// Fails if the frame is exhausted.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> CodecResult<T> {
        let bytes = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }
}
