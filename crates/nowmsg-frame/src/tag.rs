//! Payload type tags.
//!
//! The tag byte tells the receiver how to reinterpret a frame's payload.
//! Values are stable on the wire; new kinds must take a new number.

use std::fmt;

use serde::Serialize;

/// Discriminant identifying the kind of value a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Tag {
    /// 32-bit signed integer.
    Int = 0,
    /// 16-bit signed integer.
    Short = 1,
    /// 64-bit signed integer.
    Long = 2,
    /// 32-bit float.
    Float = 3,
    /// 64-bit float.
    Double = 4,
    /// Single byte.
    Byte = 5,
    /// UTF-8 text; length is the byte count.
    Text = 6,
    /// Boolean, one byte 0 or 1.
    Bool = 7,
    /// Fixed-layout [`Record`](crate::Record).
    Record = 8,
    /// Opaque application bytes; length is the byte count.
    Unknown = 9,
}

impl Tag {
    pub const ALL: [Tag; 10] = [
        Tag::Int,
        Tag::Short,
        Tag::Long,
        Tag::Float,
        Tag::Double,
        Tag::Byte,
        Tag::Text,
        Tag::Bool,
        Tag::Record,
        Tag::Unknown,
    ];

    /// Decode a wire tag byte.
    pub fn from_u8(raw: u8) -> Option<Tag> {
        Tag::ALL.get(usize::from(raw)).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name, also accepted by [`Tag::from_name`].
    pub fn name(self) -> &'static str {
        match self {
            Tag::Int => "int",
            Tag::Short => "short",
            Tag::Long => "long",
            Tag::Float => "float",
            Tag::Double => "double",
            Tag::Byte => "byte",
            Tag::Text => "text",
            Tag::Bool => "bool",
            Tag::Record => "record",
            Tag::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Tag> {
        Tag::ALL
            .iter()
            .copied()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
    }

    /// True for the numeric, byte and bool kinds that fit one cell and can
    /// form arrays.
    pub fn is_cell(self) -> bool {
        !matches!(self, Tag::Text | Tag::Record | Tag::Unknown)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
