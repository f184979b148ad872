//! Fixed-layout big-endian wire codec.
//!
//! Every structure handed to the proving circuit is a plain concatenation of 32-byte field
//! elements and fixed-width integers, without length prefixes. Readers therefore always know
//! up front how many items they expect, and any deviation is reported as an error instead of
//! being silently padded or truncated.

use idxtree_errors::{GeneralError, TreeError};

/// Width of a serialized field element or hash.
pub const FIELD_SIZE: usize = 32;

pub trait WireEncode {
    fn write_wire(&self, writer: &mut WireWriter);

    fn to_wire(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.write_wire(&mut writer);
        writer.into_bytes()
    }
}

pub trait WireDecode: Sized {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError>;

    /// Decodes a value that must span the whole buffer.
    fn from_wire(bytes: &[u8]) -> Result<Self, TreeError> {
        let mut reader = WireReader::new(bytes);
        let value = Self::read_wire(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an integer left-padded to a full field element.
    pub fn write_u64_as_field(&mut self, value: u64) {
        let mut field = [0u8; FIELD_SIZE];
        field[FIELD_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
        self.buf.extend_from_slice(&field);
    }

    pub fn write_all<T: WireEncode>(&mut self, items: &[T]) {
        for item in items {
            item.write_wire(self);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], TreeError> {
        let end = self.offset.checked_add(len).filter(|end| *end <= self.buf.len()).ok_or_else(
            || TreeError::OffsetOutOfBounds {
                offset: self.offset,
                requested: len,
                available: self.buf.len(),
            },
        )?;
        let bytes = &self.buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TreeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32, TreeError> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    /// Reads a field-sized big-endian integer that has to fit into a `u64`.
    pub fn read_u64_from_field(&mut self) -> Result<u64, TreeError> {
        let field = self.read_array::<FIELD_SIZE>()?;
        let (high, low) = field.split_at(FIELD_SIZE - 8);
        if high.iter().any(|b| *b != 0) {
            return Err(GeneralError::DecodingError(format!(
                "integer 0x{} does not fit into 64 bits",
                hex::encode(field)
            ))
            .into());
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(low);
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn read_vec<T: WireDecode>(&mut self, count: usize) -> Result<Vec<T>, TreeError> {
        self.read_vec_with(count, T::read_wire)
    }

    pub fn read_vec_with<T, F>(&mut self, count: usize, mut read: F) -> Result<Vec<T>, TreeError>
    where
        F: FnMut(&mut Self) -> Result<T, TreeError>,
    {
        (0..count).map(|_| read(self)).collect()
    }

    /// Fails if any bytes are left unread.
    pub fn finish(self) -> Result<(), TreeError> {
        if self.remaining() != 0 {
            return Err(TreeError::length_mismatch(
                "decoded buffer",
                self.offset,
                self.buf.len(),
            ));
        }
        Ok(())
    }
}

impl WireEncode for u32 {
    fn write_wire(&self, writer: &mut WireWriter) {
        writer.write_u32(*self);
    }
}

impl WireDecode for u32 {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        reader.read_u32()
    }
}
