use crate::tag::Tag;

/// Errors that can occur while building, encoding or decoding frames.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4E4D \"NM\")")]
    InvalidMagic,

    /// The raw frame is not exactly one frame long.
    #[error("invalid frame length ({len} bytes, expected {expected})")]
    InvalidLength { len: usize, expected: usize },

    /// The tag byte does not name a known kind.
    #[error("unknown payload tag {0}")]
    UnknownTag(u8),

    /// The length field exceeds what the tag allows.
    #[error("length {len} out of range for {tag} (max {max})")]
    LengthOutOfRange { tag: Tag, len: usize, max: usize },

    /// An array has more elements than a frame holds.
    #[error("array too long ({len} elements, max {max})")]
    ArrayTooLong { len: usize, max: usize },

    /// Arrays carry at least one element; length 0 means scalar.
    #[error("array must not be empty")]
    EmptyArray,

    /// Text or opaque bytes do not fit in the payload.
    #[error("payload too large ({len} bytes, max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// The frame holds a different kind than the one requested.
    #[error("tag mismatch: expected {expected}, found {found}")]
    TagMismatch { expected: Tag, found: Tag },

    /// A scalar was requested but the frame holds an array.
    #[error("{tag} frame holds an array of {len}, not a scalar")]
    NotScalar { tag: Tag, len: usize },

    /// An array was requested but the frame holds a scalar.
    #[error("{0} frame holds a scalar, not an array")]
    NotArray(Tag),

    /// The caller's output buffer cannot hold the array.
    #[error("output buffer too small ({available} slots, need {needed})")]
    BufferTooSmall { needed: usize, available: usize },

    /// A bool cell holds something other than 0 or 1.
    #[error("invalid bool byte 0x{0:02x}")]
    InvalidBool(u8),

    /// Text is not valid UTF-8.
    #[error("text is not valid UTF-8")]
    InvalidText,
}

pub type Result<T> = std::result::Result<T, FrameError>;
