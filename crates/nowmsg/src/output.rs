use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nowmsg_frame::{ArrayValue, Message, Value, FRAME_SIZE};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    tag: &'static str,
    len: usize,
    is_array: bool,
    size: usize,
    value: &'a Value,
    hex: String,
}

/// Print one frame: its header fields, decoded value and wire bytes.
pub fn print_frame(msg: &Message, value: &Value, format: OutputFormat) {
    let hex = to_hex(&msg.to_bytes());
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                tag: msg.tag().name(),
                len: msg.len(),
                is_array: msg.is_array(),
                size: FRAME_SIZE,
                value,
                hex,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["TAG", "LEN", "SIZE", "VALUE"]);
            table.add_row(vec![
                msg.tag().name().to_string(),
                msg.len().to_string(),
                FRAME_SIZE.to_string(),
                value_preview(value),
            ]);
            println!("{table}");
            println!("{hex}");
        }
        OutputFormat::Pretty => {
            println!(
                "tag={} len={} size={} value={}",
                msg.tag(),
                msg.len(),
                FRAME_SIZE,
                value_preview(value)
            );
            println!("{hex}");
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Short human-readable rendering of a value.
pub fn value_preview(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Short(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Byte(v) => format!("0x{v:02x}"),
        Value::Bool(v) => v.to_string(),
        Value::Array(array) => array_preview(array),
        Value::Text(text) => format!("{text:?}"),
        Value::Record(record) => format!(
            "{{kind={} text={:?} int={} float={} flag={}}}",
            record.kind,
            record.text(),
            record.int,
            record.float,
            record.flag
        ),
        Value::Opaque(data) => format!("<{} bytes> {}", data.len(), to_hex(data)),
    }
}

fn array_preview(array: &ArrayValue) -> String {
    fn join<T: ToString>(values: &[T]) -> String {
        let items: Vec<String> = values.iter().map(ToString::to_string).collect();
        format!("[{}]", items.join(", "))
    }

    match array {
        ArrayValue::Int(v) => join(v),
        ArrayValue::Short(v) => join(v),
        ArrayValue::Long(v) => join(v),
        ArrayValue::Float(v) => join(v),
        ArrayValue::Double(v) => join(v),
        ArrayValue::Byte(v) => join(v),
        ArrayValue::Bool(v) => join(v),
    }
}

pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Parse hex, ignoring whitespace and `:` separators. `None` on odd length
/// or a non-hex digit.
pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(digits).ok()
}

#[cfg(test)]
mod tests {
    use nowmsg_frame::Record;

    use super::*;

    #[test]
    fn hex_round_trip() {
        let data = [0x4e, 0x4d, 0x00, 0xff];
        assert_eq!(to_hex(&data), "4e4d00ff");
        assert_eq!(from_hex("4e4d00ff").as_deref(), Some(&data[..]));
        assert_eq!(from_hex("4E 4D:00\nFF").as_deref(), Some(&data[..]));
        assert_eq!(from_hex("4e4"), None);
        assert_eq!(from_hex("zz"), None);
        assert_eq!(from_hex("+f+f"), None);
    }

    #[test]
    fn previews() {
        assert_eq!(value_preview(&Value::Int(-3)), "-3");
        assert_eq!(value_preview(&Value::Byte(10)), "0x0a");
        assert_eq!(
            value_preview(&Value::Array(ArrayValue::Short(vec![1, 2]))),
            "[1, 2]"
        );
        assert_eq!(value_preview(&Value::Text("hi".into())), "\"hi\"");

        let record = Record::new(1, "t", 2, 0.5, true).unwrap();
        assert_eq!(
            value_preview(&Value::Record(record)),
            "{kind=1 text=\"t\" int=2 float=0.5 flag=true}"
        );
    }
}
