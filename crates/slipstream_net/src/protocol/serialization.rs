//! # Wire Serialization
//!
//! Little-endian primitive writer/reader shared by every message.
//!
//! ## Design
//!
//! - The writer grows a `Vec<u8>`: snapshot size depends on the world, so
//!   there is no fixed MTU buffer here. Fragmentation is the transport's job.
//! - The reader never panics: every read returns `ProtocolResult`, so a
//!   short or lying payload becomes a protocol error for that peer.
//! - Enums travel as the hash of their symbolic variant name.

use bytemuck::{bytes_of, Pod};
use slipstream_core::symbol_hash;

use crate::error::{ProtocolError, ProtocolResult};

/// An enum whose variants are sent as name hashes.
///
/// Hashing the name rather than the discriminant keeps server and client
/// compatible when variants are reordered.
pub trait SymbolEnum: Sized + Copy + 'static {
    /// Name used in error messages.
    const ENUM_NAME: &'static str;
    /// Every variant.
    const VARIANTS: &'static [Self];

    /// Symbolic name of this variant.
    fn symbol(self) -> &'static str;

    /// Hash of [`symbol`](Self::symbol).
    #[must_use]
    fn symbol_hash(self) -> u32 {
        symbol_hash(self.symbol())
    }

    /// Looks a variant up by hash.
    #[must_use]
    fn from_symbol_hash(hash: u32) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.symbol_hash() == hash)
    }
}

/// Message writer.
///
/// Reuse one writer per tick with [`reset`](Self::reset) to keep the
/// allocation around.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with `capacity` bytes reserved.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Resets the writer for reuse.
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

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Overwrites four bytes at `offset` with `value`. Used to back-patch
    /// counts once the records are written.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` is past the end of the written data.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
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

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a fixed-length float sequence (vector, quaternion, matrix).
    pub fn write_f32s(&mut self, values: &[f32]) {
        for &value in values {
            self.write_f32(value);
        }
    }

    /// Writes a `u32` count followed by the floats.
    pub fn write_f32_list(&mut self, values: &[f32]) {
        self.write_len(values.len());
        self.write_f32s(values);
    }

    /// Writes a `u32` length followed by UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) {
        self.write_len(value.len());
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Writes an enum as its symbol hash.
    #[inline]
    pub fn write_symbol<E: SymbolEnum>(&mut self, value: E) {
        self.write_u32(value.symbol_hash());
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }

    fn write_len(&mut self, len: usize) {
        let len = u32::try_from(len)
            .unwrap_or_else(|_| panic!("field of {len} elements does not fit a u32 length"));
        self.write_u32(len);
    }
}

/// Message reader.
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over `buffer`.
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

    /// Current read offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Fails unless at least `needed` bytes remain.
    #[inline]
    pub fn ensure(&self, needed: usize) -> ProtocolResult<()> {
        if self.remaining() < needed {
            return Err(ProtocolError::Truncated {
                offset: self.position,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Fails if any bytes are left.
    pub fn finish(&self) -> ProtocolResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }

    fn take(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        self.ensure(len)?;
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads `N` floats.
    pub fn read_f32s<const N: usize>(&mut self) -> ProtocolResult<[f32; N]> {
        self.ensure(N * 4)?;
        let mut values = [0.0f32; N];
        for value in &mut values {
            *value = self.read_f32()?;
        }
        Ok(values)
    }

    /// Reads a `u32` count followed by that many floats.
    pub fn read_f32_list(&mut self) -> ProtocolResult<Vec<f32>> {
        let len = self.read_len(4)?;
        (0..len).map(|_| self.read_f32()).collect()
    }

    /// Reads a `u32` length followed by UTF-8 bytes.
    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let len = self.read_len(1)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Reads an enum from its symbol hash.
    pub fn read_symbol<E: SymbolEnum>(&mut self) -> ProtocolResult<E> {
        let hash = self.read_u32()?;
        E::from_symbol_hash(hash).ok_or(ProtocolError::UnknownVariant {
            enum_name: E::ENUM_NAME,
            hash,
        })
    }

    /// Reads a Pod type directly.
    pub fn read_pod<T: Pod>(&mut self) -> ProtocolResult<T> {
        let bytes = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Reads a length prefix and checks the elements can fit.
    fn read_len(&mut self, element_size: usize) -> ProtocolResult<usize> {
        let len = self.read_u32()? as usize;
        self.ensure(len.saturating_mul(element_size))?;
        Ok(len)
    }
}
