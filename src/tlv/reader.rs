//! Strict sequential reader for tagged scene records.

use super::ElementType;
use crate::error::{Result, SceneError};

/// Reads tagged elements from a byte slice in order.
///
/// Every accessor states the tag (and element type) it expects; anything
/// else in the buffer is a decode failure. There is no skipping and no
/// recovery, matching the strictness required of stored scene records.
pub struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| SceneError::Decode("record truncated".into()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn element_type_at(&self, pos: usize) -> Result<ElementType> {
        let raw = *self
            .buf
            .get(pos)
            .ok_or_else(|| SceneError::Decode("record truncated".into()))?;
        ElementType::from_repr(raw)
            .ok_or_else(|| SceneError::Decode(format!("unknown element type {raw:#04x}")))
    }

    /// Look at the next element's type and tag without consuming it. The
    /// end-of-structure marker has no tag.
    pub fn peek(&self) -> Result<(ElementType, Option<u8>)> {
        let element_type = self.element_type_at(self.pos)?;
        if element_type == ElementType::StructEnd {
            return Ok((element_type, None));
        }
        let tag = *self
            .buf
            .get(self.pos + 1)
            .ok_or_else(|| SceneError::Decode("record truncated".into()))?;
        Ok((element_type, Some(tag)))
    }

    /// Consume the header of the next element, verifying type and tag.
    fn expect_header(&mut self, expected: ElementType, tag: u8) -> Result<()> {
        let element_type = self.element_type_at(self.pos)?;
        if element_type != expected {
            return Err(SceneError::Decode(format!(
                "expected {expected:?} element, found {element_type:?}"
            )));
        }
        self.pos += 1;
        let actual_tag = self.take(1)?[0];
        if actual_tag != tag {
            return Err(SceneError::Decode(format!(
                "expected tag {tag}, found tag {actual_tag}"
            )));
        }
        Ok(())
    }

    /// Consume the start marker of a structure with the given tag.
    pub fn enter_struct(&mut self, tag: u8) -> Result<()> {
        self.expect_header(ElementType::StructStart, tag)
    }

    /// Consume the end marker of the current structure. Any leftover field
    /// before the marker is a decode failure.
    pub fn exit_struct(&mut self) -> Result<()> {
        let element_type = self.element_type_at(self.pos)?;
        if element_type != ElementType::StructEnd {
            return Err(SceneError::Decode(format!(
                "expected end of structure, found {element_type:?}"
            )));
        }
        self.pos += 1;
        Ok(())
    }

    pub fn read_u8(&mut self, tag: u8) -> Result<u8> {
        self.expect_header(ElementType::U8, tag)?;
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self, tag: u8) -> Result<u16> {
        self.expect_header(ElementType::U16, tag)?;
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self, tag: u8) -> Result<u32> {
        self.expect_header(ElementType::U32, tag)?;
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_str(&mut self, tag: u8) -> Result<&'a str> {
        self.expect_header(ElementType::Utf8, tag)?;
        let len = self.take(1)?[0] as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map_err(|_| SceneError::Decode("string field is not valid UTF-8".into()))
    }

    pub fn read_bytes(&mut self, tag: u8) -> Result<&'a [u8]> {
        self.expect_header(ElementType::Bytes, tag)?;
        let len = self.take(1)?[0] as usize;
        self.take(len)
    }
}
