use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::tag::Tag;
use crate::value::{Record, WireValue, RECORD_SIZE};

/// Frame header: magic (2) + tag (1) + length (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Magic bytes: "NM" (0x4E 0x4D).
pub const MAGIC: [u8; 2] = [0x4E, 0x4D];

/// Size of one scalar or array element slot.
pub const CELL_SIZE: usize = 8;

/// Maximum number of elements in an array frame.
pub const ARRAY_CAPACITY: usize = 30;

/// Payload area shared by every kind of frame.
pub const PAYLOAD_SIZE: usize = CELL_SIZE * ARRAY_CAPACITY;

/// Total wire size of every frame, whatever it carries.
pub const FRAME_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

const _: () = assert!(FRAME_SIZE <= nowmsg_transport::MAX_DATA_LEN);
const _: () = assert!(RECORD_SIZE <= PAYLOAD_SIZE);
const _: () = assert!(PAYLOAD_SIZE <= u8::MAX as usize);

/// One tagged value, as carried by exactly one frame.
///
/// A message is immutable once built. Constructors validate sizes, so every
/// message encodes; typed accessors check the tag before reinterpreting the
/// payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    tag: Tag,
    len: u8,
    payload: [u8; PAYLOAD_SIZE],
}

impl Message {
    fn empty(tag: Tag, len: usize) -> Self {
        Self {
            tag,
            len: len as u8,
            payload: [0u8; PAYLOAD_SIZE],
        }
    }

    /// A single scalar value.
    pub fn scalar<T: WireValue>(value: T) -> Self {
        let mut msg = Self::empty(T::TAG, 0);
        value.write_cell(&mut msg.payload[..CELL_SIZE]);
        msg
    }

    /// An array of 1 to [`ARRAY_CAPACITY`] values. Longer input is an error,
    /// never truncated.
    pub fn array<T: WireValue>(values: &[T]) -> Result<Self> {
        if values.is_empty() {
            return Err(FrameError::EmptyArray);
        }
        if values.len() > ARRAY_CAPACITY {
            return Err(FrameError::ArrayTooLong {
                len: values.len(),
                max: ARRAY_CAPACITY,
            });
        }
        let mut msg = Self::empty(T::TAG, values.len());
        for (value, cell) in values.iter().zip(msg.payload.chunks_exact_mut(CELL_SIZE)) {
            value.write_cell(cell);
        }
        Ok(msg)
    }

    /// UTF-8 text of up to [`PAYLOAD_SIZE`] bytes.
    pub fn text(text: &str) -> Result<Self> {
        Self::bytes_with_tag(Tag::Text, text.as_bytes())
    }

    /// Opaque application bytes of up to [`PAYLOAD_SIZE`] bytes.
    pub fn opaque(data: &[u8]) -> Result<Self> {
        Self::bytes_with_tag(Tag::Unknown, data)
    }

    pub fn record(record: &Record) -> Self {
        let mut msg = Self::empty(Tag::Record, 0);
        record.write_to(&mut msg.payload[..RECORD_SIZE]);
        msg
    }

    fn bytes_with_tag(tag: Tag, data: &[u8]) -> Result<Self> {
        if data.len() > PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                len: data.len(),
                max: PAYLOAD_SIZE,
            });
        }
        let mut msg = Self::empty(tag, data.len());
        msg.payload[..data.len()].copy_from_slice(data);
        Ok(msg)
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Raw length field: element count for arrays, byte count for text and
    /// opaque payloads, 0 for scalars and records.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the message holds an array of cell values.
    pub fn is_array(&self) -> bool {
        self.tag.is_cell() && self.len > 0
    }

    /// Read a scalar of type `T`.
    pub fn value<T: WireValue>(&self) -> Result<T> {
        self.expect_tag(T::TAG)?;
        if self.len != 0 {
            return Err(FrameError::NotScalar {
                tag: self.tag,
                len: self.len(),
            });
        }
        T::read_cell(&self.payload[..CELL_SIZE])
    }

    /// Copy an array of `T` into `out`, returning the element count.
    pub fn read_array<T: WireValue>(&self, out: &mut [T]) -> Result<usize> {
        self.expect_tag(T::TAG)?;
        if self.len == 0 {
            return Err(FrameError::NotArray(self.tag));
        }
        let len = self.len();
        if out.len() < len {
            return Err(FrameError::BufferTooSmall {
                needed: len,
                available: out.len(),
            });
        }
        for (slot, cell) in out.iter_mut().zip(self.cells()) {
            *slot = T::read_cell(cell)?;
        }
        Ok(len)
    }

    /// Collect an array of `T`.
    pub fn to_vec<T: WireValue>(&self) -> Result<Vec<T>> {
        self.expect_tag(T::TAG)?;
        if self.len == 0 {
            return Err(FrameError::NotArray(self.tag));
        }
        self.cells().map(T::read_cell).collect()
    }

    pub fn as_text(&self) -> Result<&str> {
        self.expect_tag(Tag::Text)?;
        std::str::from_utf8(&self.payload[..self.len()]).map_err(|_| FrameError::InvalidText)
    }

    pub fn as_record(&self) -> Result<Record> {
        self.expect_tag(Tag::Record)?;
        Record::read_from(&self.payload[..RECORD_SIZE])
    }

    pub fn as_opaque(&self) -> Result<&[u8]> {
        self.expect_tag(Tag::Unknown)?;
        Ok(&self.payload[..self.len()])
    }

    /// Encode into a freshly allocated frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_SIZE);
        encode_frame(self, &mut buf);
        buf.freeze()
    }

    fn cells(&self) -> impl Iterator<Item = &[u8]> {
        self.payload.chunks_exact(CELL_SIZE).take(self.len())
    }

    fn expect_tag(&self, expected: Tag) -> Result<()> {
        if self.tag != expected {
            return Err(FrameError::TagMismatch {
                expected,
                found: self.tag,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("tag", &self.tag)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────┬─────────┬──────────────────────────────┐
/// │ Magic (2B) │ Tag     │ Length  │ Payload (240B)               │
/// │ 0x4E 0x4D  │ (1B)    │ (1B)    │ scalar cell | 30 array cells │
/// │ "NM"       │         │         │ | text | record | opaque     │
/// └────────────┴─────────┴─────────┴──────────────────────────────┘
/// ```
///
/// Every frame is exactly [`FRAME_SIZE`] bytes; unused payload bytes are zero.
pub fn encode_frame(msg: &Message, dst: &mut BytesMut) {
    dst.reserve(FRAME_SIZE);
    dst.put_slice(&MAGIC);
    dst.put_u8(msg.tag.as_u8());
    dst.put_u8(msg.len);
    dst.put_slice(&msg.payload);
}

/// Decode one frame.
///
/// Checks structure only (size, magic, tag, length range). Content checks
/// such as UTF-8 validity happen in the typed accessors.
pub fn decode_frame(src: &[u8]) -> Result<Message> {
    if src.len() != FRAME_SIZE {
        return Err(FrameError::InvalidLength {
            len: src.len(),
            expected: FRAME_SIZE,
        });
    }

    let mut buf = src;
    if buf[..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    buf.advance(MAGIC.len());

    let raw_tag = buf.get_u8();
    let tag = Tag::from_u8(raw_tag).ok_or(FrameError::UnknownTag(raw_tag))?;
    let len = buf.get_u8();

    let max = match tag {
        Tag::Text | Tag::Unknown => PAYLOAD_SIZE,
        Tag::Record => 0,
        _ => ARRAY_CAPACITY,
    };
    if usize::from(len) > max {
        return Err(FrameError::LengthOutOfRange {
            tag,
            len: usize::from(len),
            max,
        });
    }

    let mut payload = [0u8; PAYLOAD_SIZE];
    buf.copy_to_slice(&mut payload);

    Ok(Message { tag, len, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), FRAME_SIZE);
        decode_frame(&bytes).unwrap()
    }

    #[test]
    fn scalar_round_trip() {
        assert_eq!(round_trip(&Message::scalar(-1234i16)).value::<i16>(), Ok(-1234));
        assert_eq!(round_trip(&Message::scalar(1234i32)).value::<i32>(), Ok(1234));
        assert_eq!(
            round_trip(&Message::scalar(i64::MIN)).value::<i64>(),
            Ok(i64::MIN)
        );
        assert_eq!(round_trip(&Message::scalar(1.5f32)).value::<f32>(), Ok(1.5));
        assert_eq!(
            round_trip(&Message::scalar(std::f64::consts::PI)).value::<f64>(),
            Ok(std::f64::consts::PI)
        );
        assert_eq!(round_trip(&Message::scalar(b'x')).value::<u8>(), Ok(b'x'));
        assert_eq!(round_trip(&Message::scalar(true)).value::<bool>(), Ok(true));
        assert_eq!(round_trip(&Message::scalar(false)).value::<bool>(), Ok(false));
    }

    fn check_arrays<T, F>(make: F)
    where
        T: WireValue + PartialEq + fmt::Debug,
        F: Fn(usize) -> T,
    {
        for len in 1..=ARRAY_CAPACITY {
            let values: Vec<T> = (0..len).map(&make).collect();
            let decoded = round_trip(&Message::array(&values).unwrap());
            assert!(decoded.is_array());
            assert_eq!(decoded.len(), len);
            assert_eq!(decoded.to_vec::<T>().unwrap(), values);
        }
    }

    #[test]
    fn array_round_trip_every_length() {
        check_arrays(|i| i as i16 - 15);
        check_arrays(|i| (i as i32) * 1_000_003);
        check_arrays(|i| (i as i64) << 40);
        check_arrays(|i| i as f32 / 4.0);
        check_arrays(|i| i as f64 * -0.125);
        check_arrays(|i| i as u8);
        check_arrays(|i| i % 3 == 0);
    }

    #[test]
    fn array_longer_than_capacity_is_rejected() {
        let values = [0i32; ARRAY_CAPACITY + 1];
        assert_eq!(
            Message::array(&values),
            Err(FrameError::ArrayTooLong {
                len: ARRAY_CAPACITY + 1,
                max: ARRAY_CAPACITY
            })
        );
        assert_eq!(Message::array::<i32>(&[]), Err(FrameError::EmptyArray));
    }

    #[test]
    fn read_array_into_buffer() {
        let msg = Message::array(&[1.0f64, 2.0, 3.0]).unwrap();
        let mut out = [0.0f64; 8];
        assert_eq!(msg.read_array(&mut out), Ok(3));
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);

        let mut small = [0.0f64; 2];
        assert_eq!(
            msg.read_array(&mut small),
            Err(FrameError::BufferTooSmall {
                needed: 3,
                available: 2
            })
        );
    }

    #[test]
    fn typed_reads_check_tag_and_shape() {
        let int = Message::scalar(42i32);
        assert_eq!(
            int.value::<f32>(),
            Err(FrameError::TagMismatch {
                expected: Tag::Float,
                found: Tag::Int
            })
        );
        assert_eq!(int.to_vec::<i32>(), Err(FrameError::NotArray(Tag::Int)));
        assert!(!int.is_array());

        let array = Message::array(&[1i32, 2]).unwrap();
        assert_eq!(
            array.value::<i32>(),
            Err(FrameError::NotScalar {
                tag: Tag::Int,
                len: 2
            })
        );
        assert!(matches!(
            array.as_text(),
            Err(FrameError::TagMismatch { .. })
        ));
    }

    #[test]
    fn text_and_opaque_round_trip() {
        let text = round_trip(&Message::text("héllo").unwrap());
        assert_eq!(text.tag(), Tag::Text);
        assert_eq!(text.as_text(), Ok("héllo"));
        assert!(!text.is_array());

        let blob = round_trip(&Message::opaque(&[9, 8, 7]).unwrap());
        assert_eq!(blob.as_opaque(), Ok(&[9u8, 8, 7][..]));

        let too_long = "x".repeat(PAYLOAD_SIZE + 1);
        assert!(matches!(
            Message::text(&too_long),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn decode_rejects_wrong_size() {
        let err = decode_frame(&[0x4E, 0x4D, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidLength {
                len: 4,
                expected: FRAME_SIZE
            }
        );
    }

    #[test]
    fn decode_rejects_invalid_magic() {
        let mut raw = Message::scalar(1i32).to_bytes().to_vec();
        raw[0] = 0xFF;
        assert_eq!(decode_frame(&raw), Err(FrameError::InvalidMagic));
    }

    #[test]
    fn decode_rejects_unknown_tag_and_bad_length() {
        let mut raw = Message::scalar(1i32).to_bytes().to_vec();
        raw[2] = 42;
        assert_eq!(decode_frame(&raw), Err(FrameError::UnknownTag(42)));

        let mut raw = Message::scalar(1i32).to_bytes().to_vec();
        raw[3] = (ARRAY_CAPACITY + 1) as u8;
        assert!(matches!(
            decode_frame(&raw),
            Err(FrameError::LengthOutOfRange { tag: Tag::Int, .. })
        ));

        let mut raw = Message::record(&Record::default()).to_bytes().to_vec();
        raw[3] = 1;
        assert!(matches!(
            decode_frame(&raw),
            Err(FrameError::LengthOutOfRange {
                tag: Tag::Record,
                max: 0,
                ..
            })
        ));
    }

    #[test]
    fn invalid_bool_cell_surfaces_on_read() {
        let mut raw = Message::scalar(true).to_bytes().to_vec();
        raw[HEADER_SIZE] = 7;
        let msg = decode_frame(&raw).unwrap();
        assert_eq!(msg.value::<bool>(), Err(FrameError::InvalidBool(7)));
    }

    #[test]
    fn encode_appends_to_existing_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(&Message::scalar(1u8), &mut buf);
        encode_frame(&Message::scalar(2u8), &mut buf);
        assert_eq!(buf.len(), 2 * FRAME_SIZE);

        let second = decode_frame(&buf[FRAME_SIZE..]).unwrap();
        assert_eq!(second.value::<u8>(), Ok(2));
    }
}
