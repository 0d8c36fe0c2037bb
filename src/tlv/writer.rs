//! Tagged element writer over an owned growable buffer.

use super::ElementType;
use crate::error::{Result, SceneError};

/// Longest string or byte-string payload the one-byte length prefix can carry.
const LENGTH_PREFIX_MAX: usize = u8::MAX as usize;

/// Writes tagged elements into an owned buffer.
///
/// Structures are written through [`TlvWriter::write_struct`], which scopes
/// the start/end markers around a closure so unbalanced containers cannot be
/// produced.
///
/// # Example
/// ```ignore
/// let mut writer = TlvWriter::new();
/// writer.write_struct(1, |w| {
///     w.put_u16(2, endpoint_id);
///     w.put_u8(4, scene_id);
///     Ok(())
/// })?;
/// let bytes = writer.finish();
/// ```
#[derive(Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn header(&mut self, element_type: ElementType, tag: u8) {
        self.buf.push(element_type as u8);
        self.buf.push(tag);
    }

    /// Write a structure: start marker, the fields produced by `fields`,
    /// end marker.
    pub fn write_struct<F>(&mut self, tag: u8, fields: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.header(ElementType::StructStart, tag);
        fields(self)?;
        self.buf.push(ElementType::StructEnd as u8);
        Ok(())
    }

    pub fn put_u8(&mut self, tag: u8, value: u8) {
        self.header(ElementType::U8, tag);
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, tag: u8, value: u16) {
        self.header(ElementType::U16, tag);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, tag: u8, value: u32) {
        self.header(ElementType::U32, tag);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a UTF-8 string element. Fails with `BufferTooSmall` if the
    /// string is longer than the length prefix allows.
    pub fn put_str(&mut self, tag: u8, value: &str) -> Result<()> {
        self.put_prefixed(ElementType::Utf8, tag, value.as_bytes())
    }

    /// Write a byte-string element. Fails with `BufferTooSmall` if the slice
    /// is longer than the length prefix allows.
    pub fn put_bytes(&mut self, tag: u8, value: &[u8]) -> Result<()> {
        self.put_prefixed(ElementType::Bytes, tag, value)
    }

    fn put_prefixed(&mut self, element_type: ElementType, tag: u8, value: &[u8]) -> Result<()> {
        if value.len() > LENGTH_PREFIX_MAX {
            return Err(SceneError::BufferTooSmall);
        }
        self.header(element_type, tag);
        self.buf.push(value.len() as u8);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Consume the writer and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
