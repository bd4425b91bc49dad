//! Fixed-size tagged frames for nowmsg.
//!
//! Every message travels as exactly one frame:
//! - A 2-byte magic number ("NM") to reject foreign datagrams
//! - A 1-byte [`Tag`] naming the payload kind
//! - A 1-byte length: 0 for a scalar, the element count for an array,
//!   the byte count for text and opaque payloads
//! - A 240-byte payload of thirty 8-byte cells
//!
//! Typed accessors refuse to reinterpret a frame as the wrong kind.

pub mod codec;
pub mod error;
pub mod tag;
pub mod value;

pub use codec::{
    decode_frame, encode_frame, Message, ARRAY_CAPACITY, CELL_SIZE, FRAME_SIZE, HEADER_SIZE,
    MAGIC, PAYLOAD_SIZE,
};
pub use error::{FrameError, Result};
pub use tag::Tag;
pub use value::{ArrayValue, Record, Value, WireValue, RECORD_SIZE, RECORD_TEXT_CAPACITY};
