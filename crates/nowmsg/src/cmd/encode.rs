use std::str::FromStr;

use nowmsg_frame::{ArrayValue, Message, Record, Tag, Value};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{from_hex, print_frame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let value = parse_value(args.tag, &args.values, args.array)?;
    let msg = Message::from_value(&value).map_err(|err| frame_error("encode failed", err))?;
    tracing::debug!(tag = %msg.tag(), len = msg.len(), "frame encoded");
    print_frame(&msg, &value, format);
    Ok(SUCCESS)
}

/// Build a value of kind `tag` from command-line words.
pub fn parse_value(tag: Tag, words: &[String], force_array: bool) -> CliResult<Value> {
    if force_array && !tag.is_cell() {
        return Err(CliError::new(USAGE, format!("--array does not apply to {tag}")));
    }
    let array = force_array || words.len() > 1;

    match tag {
        Tag::Int => cells(words, array, Value::Int, ArrayValue::Int),
        Tag::Short => cells(words, array, Value::Short, ArrayValue::Short),
        Tag::Long => cells(words, array, Value::Long, ArrayValue::Long),
        Tag::Float => cells(words, array, Value::Float, ArrayValue::Float),
        Tag::Double => cells(words, array, Value::Double, ArrayValue::Double),
        Tag::Byte => cells(words, array, Value::Byte, ArrayValue::Byte),
        Tag::Bool => cells(words, array, Value::Bool, ArrayValue::Bool),
        Tag::Text => Ok(Value::Text(words.join(" "))),
        Tag::Record => parse_record(words).map(Value::Record),
        Tag::Unknown => from_hex(&words.concat())
            .map(Value::Opaque)
            .ok_or_else(|| CliError::new(USAGE, "unknown payload must be hex bytes")),
    }
}

fn cells<T: FromStr>(
    words: &[String],
    array: bool,
    scalar: fn(T) -> Value,
    vector: fn(Vec<T>) -> ArrayValue,
) -> CliResult<Value> {
    let parsed = words
        .iter()
        .map(|word| parse_word::<T>(word))
        .collect::<CliResult<Vec<T>>>()?;

    if array {
        return Ok(Value::Array(vector(parsed)));
    }
    parsed
        .into_iter()
        .next()
        .map(scalar)
        .ok_or_else(|| CliError::new(USAGE, "a value is required"))
}

fn parse_word<T: FromStr>(word: &str) -> CliResult<T> {
    word.trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid value: {word}")))
}

fn parse_record(words: &[String]) -> CliResult<Record> {
    let [kind, text, int, float, flag] = words else {
        return Err(CliError::new(
            USAGE,
            "record takes five values: kind text int float flag",
        ));
    };
    Record::new(
        parse_word(kind)?,
        text,
        parse_word(int)?,
        parse_word(float)?,
        parse_word(flag)?,
    )
    .map_err(|err| frame_error("invalid record", err))
}
