use bytes::{Buf, BufMut};
use serde::Serialize;

use crate::codec::Message;
use crate::error::{FrameError, Result};
use crate::tag::Tag;

/// Capacity of a record's text field, in bytes.
pub const RECORD_TEXT_CAPACITY: usize = 40;

/// Wire size of a record: kind (1) + text (40) + int (4) + float (4) + flag (1).
pub const RECORD_SIZE: usize = 1 + RECORD_TEXT_CAPACITY + 4 + 4 + 1;

mod sealed {
    pub trait Sealed {}
}

/// Scalar types that travel in a single frame cell.
///
/// Each implementing type is bound to exactly one [`Tag`], which is what lets
/// a receiver refuse to read an `f32` frame as `i32`. Cells are little-endian.
pub trait WireValue: sealed::Sealed + Copy {
    const TAG: Tag;

    #[doc(hidden)]
    fn write_cell(self, cell: &mut [u8]);

    #[doc(hidden)]
    fn read_cell(cell: &[u8]) -> Result<Self>;
}

macro_rules! wire_value {
    ($ty:ty, $tag:expr, $put:ident, $get:ident) => {
        impl sealed::Sealed for $ty {}

        impl WireValue for $ty {
            const TAG: Tag = $tag;

            fn write_cell(self, mut cell: &mut [u8]) {
                cell.$put(self);
            }

            fn read_cell(mut cell: &[u8]) -> Result<Self> {
                Ok(cell.$get())
            }
        }
    };
}

wire_value!(i16, Tag::Short, put_i16_le, get_i16_le);
wire_value!(i32, Tag::Int, put_i32_le, get_i32_le);
wire_value!(i64, Tag::Long, put_i64_le, get_i64_le);
wire_value!(f32, Tag::Float, put_f32_le, get_f32_le);
wire_value!(f64, Tag::Double, put_f64_le, get_f64_le);
wire_value!(u8, Tag::Byte, put_u8, get_u8);

impl sealed::Sealed for bool {}

impl WireValue for bool {
    const TAG: Tag = Tag::Bool;

    fn write_cell(self, cell: &mut [u8]) {
        cell[0] = u8::from(self);
    }

    fn read_cell(cell: &[u8]) -> Result<Self> {
        match cell[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FrameError::InvalidBool(other)),
        }
    }
}

/// A small fixed-layout record: a kind byte, short text, an integer, a float
/// and a flag.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Record {
    pub kind: u8,
    text: String,
    pub int: i32,
    pub float: f32,
    pub flag: bool,
}

impl Record {
    /// Text must fit in [`RECORD_TEXT_CAPACITY`] bytes and contain no NUL.
    pub fn new(kind: u8, text: &str, int: i32, float: f32, flag: bool) -> Result<Self> {
        if text.len() > RECORD_TEXT_CAPACITY {
            return Err(FrameError::PayloadTooLarge {
                len: text.len(),
                max: RECORD_TEXT_CAPACITY,
            });
        }
        if text.contains('\0') {
            return Err(FrameError::InvalidText);
        }
        Ok(Self {
            kind,
            text: text.to_string(),
            int,
            float,
            flag,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn write_to(&self, mut buf: &mut [u8]) {
        buf.put_u8(self.kind);
        let mut text = [0u8; RECORD_TEXT_CAPACITY];
        text[..self.text.len()].copy_from_slice(self.text.as_bytes());
        buf.put_slice(&text);
        buf.put_i32_le(self.int);
        buf.put_f32_le(self.float);
        buf.put_u8(u8::from(self.flag));
    }

    pub(crate) fn read_from(mut buf: &[u8]) -> Result<Self> {
        let kind = buf.get_u8();
        let raw_text = &buf[..RECORD_TEXT_CAPACITY];
        let end = raw_text
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(RECORD_TEXT_CAPACITY);
        let text = std::str::from_utf8(&raw_text[..end])
            .map_err(|_| FrameError::InvalidText)?
            .to_string();
        buf.advance(RECORD_TEXT_CAPACITY);
        let int = buf.get_i32_le();
        let float = buf.get_f32_le();
        let flag = bool::read_cell(&buf[..1])?;
        Ok(Self {
            kind,
            text,
            int,
            float,
            flag,
        })
    }
}

/// Homogeneous array contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ArrayValue {
    Int(Vec<i32>),
    Short(Vec<i16>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Byte(Vec<u8>),
    Bool(Vec<bool>),
}

impl ArrayValue {
    pub fn tag(&self) -> Tag {
        match self {
            ArrayValue::Int(_) => Tag::Int,
            ArrayValue::Short(_) => Tag::Short,
            ArrayValue::Long(_) => Tag::Long,
            ArrayValue::Float(_) => Tag::Float,
            ArrayValue::Double(_) => Tag::Double,
            ArrayValue::Byte(_) => Tag::Byte,
            ArrayValue::Bool(_) => Tag::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Int(v) => v.len(),
            ArrayValue::Short(v) => v.len(),
            ArrayValue::Long(v) => v.len(),
            ArrayValue::Float(v) => v.len(),
            ArrayValue::Double(v) => v.len(),
            ArrayValue::Byte(v) => v.len(),
            ArrayValue::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Any value a frame can carry, decoded without knowing its type up front.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i32),
    Short(i16),
    Long(i64),
    Float(f32),
    Double(f64),
    Byte(u8),
    Bool(bool),
    Array(ArrayValue),
    Text(String),
    Record(Record),
    Opaque(Vec<u8>),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Int(_) => Tag::Int,
            Value::Short(_) => Tag::Short,
            Value::Long(_) => Tag::Long,
            Value::Float(_) => Tag::Float,
            Value::Double(_) => Tag::Double,
            Value::Byte(_) => Tag::Byte,
            Value::Bool(_) => Tag::Bool,
            Value::Array(array) => array.tag(),
            Value::Text(_) => Tag::Text,
            Value::Record(_) => Tag::Record,
            Value::Opaque(_) => Tag::Unknown,
        }
    }
}

impl Message {
    /// Build the message for a dynamically typed value.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Int(v) => Message::scalar(*v),
            Value::Short(v) => Message::scalar(*v),
            Value::Long(v) => Message::scalar(*v),
            Value::Float(v) => Message::scalar(*v),
            Value::Double(v) => Message::scalar(*v),
            Value::Byte(v) => Message::scalar(*v),
            Value::Bool(v) => Message::scalar(*v),
            Value::Array(ArrayValue::Int(v)) => Message::array(v)?,
            Value::Array(ArrayValue::Short(v)) => Message::array(v)?,
            Value::Array(ArrayValue::Long(v)) => Message::array(v)?,
            Value::Array(ArrayValue::Float(v)) => Message::array(v)?,
            Value::Array(ArrayValue::Double(v)) => Message::array(v)?,
            Value::Array(ArrayValue::Byte(v)) => Message::array(v)?,
            Value::Array(ArrayValue::Bool(v)) => Message::array(v)?,
            Value::Text(text) => Message::text(text)?,
            Value::Record(record) => Message::record(record),
            Value::Opaque(data) => Message::opaque(data)?,
        })
    }

    /// Decode whatever the message holds.
    pub fn to_value(&self) -> Result<Value> {
        macro_rules! cell {
            ($msg:expr, $variant:ident) => {
                if $msg.is_array() {
                    Value::Array(ArrayValue::$variant($msg.to_vec()?))
                } else {
                    Value::$variant($msg.value()?)
                }
            };
        }

        Ok(match self.tag() {
            Tag::Int => cell!(self, Int),
            Tag::Short => cell!(self, Short),
            Tag::Long => cell!(self, Long),
            Tag::Float => cell!(self, Float),
            Tag::Double => cell!(self, Double),
            Tag::Byte => cell!(self, Byte),
            Tag::Bool => cell!(self, Bool),
            Tag::Text => Value::Text(self.as_text()?.to_string()),
            Tag::Record => Value::Record(self.as_record()?),
            Tag::Unknown => Value::Opaque(self.as_opaque()?.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_frame;

    #[test]
    fn record_round_trip() {
        let record = Record::new(b'A', "temperature", 21, 21.5, true).unwrap();
        let msg = decode_frame(&Message::record(&record).to_bytes()).unwrap();
        assert_eq!(msg.tag(), Tag::Record);
        assert_eq!(msg.as_record(), Ok(record));
    }

    #[test]
    fn record_text_limits() {
        let full = "r".repeat(RECORD_TEXT_CAPACITY);
        let record = Record::new(0, &full, 0, 0.0, false).unwrap();
        assert_eq!(
            Message::record(&record).as_record().unwrap().text(),
            full.as_str()
        );

        let over = "r".repeat(RECORD_TEXT_CAPACITY + 1);
        assert!(matches!(
            Record::new(0, &over, 0, 0.0, false),
            Err(FrameError::PayloadTooLarge { max: RECORD_TEXT_CAPACITY, .. })
        ));
        assert_eq!(
            Record::new(0, "a\0b", 0, 0.0, false),
            Err(FrameError::InvalidText)
        );
    }

    #[test]
    fn dynamic_values_round_trip() {
        let values = [
            Value::Int(1234),
            Value::Short(-7),
            Value::Long(1 << 50),
            Value::Float(0.25),
            Value::Double(-2.5),
            Value::Byte(0xAB),
            Value::Bool(true),
            Value::Array(ArrayValue::Short(vec![1, 2, 3])),
            Value::Array(ArrayValue::Bool(vec![true, false])),
            Value::Text("hello".to_string()),
            Value::Record(Record::new(1, "r", 2, 3.0, false).unwrap()),
            Value::Opaque(vec![0, 1, 2]),
        ];
        for value in values {
            let msg = Message::from_value(&value).unwrap();
            assert_eq!(msg.tag(), value.tag());
            let decoded = decode_frame(&msg.to_bytes()).unwrap();
            assert_eq!(decoded.to_value().unwrap(), value);
        }
    }

    #[test]
    fn value_serializes_with_type_tag() {
        let json = serde_json::to_value(Value::Array(ArrayValue::Int(vec![1, 2]))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "array", "value": {"type": "int", "values": [1, 2]}})
        );
    }
}
