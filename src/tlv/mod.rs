//! Tagged binary codec for scene records.
//!
//! Every stored scene record is a sequence of tagged elements. An element is
//! one control byte (the element type), one context tag byte, and a payload;
//! the end-of-structure marker is the single exception and carries no tag.
//! Multi-byte integers are little-endian, strings and byte strings carry a
//! one-byte length prefix.
//!
//! ```txt
//! struct start   [0x15] [tag]
//! struct end     [0x18]
//! u8             [0x04] [tag] [value]
//! u16            [0x05] [tag] [lo] [hi]
//! u32            [0x06] [tag] [b0..b3]
//! utf-8 string   [0x0C] [tag] [len u8] [bytes]
//! byte string    [0x10] [tag] [len u8] [bytes]
//! ```
//!
//! Decoding is strict: a tag mismatch, a wrong element type, or a truncated
//! buffer is a hard [`SceneError::Decode`](crate::error::SceneError) failure,
//! never a best-effort recovery. Both sides of the format must reproduce this
//! layout bit-for-bit.

pub mod reader;
pub mod writer;

pub use reader::TlvReader;
pub use writer::TlvWriter;

use strum::FromRepr;

/// Control byte values for the wire elements.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u8)]
pub enum ElementType {
    U8 = 0x04,
    U16 = 0x05,
    U32 = 0x06,
    Utf8 = 0x0C,
    Bytes = 0x10,
    StructStart = 0x15,
    StructEnd = 0x18,
}
