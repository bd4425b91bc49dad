use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use nowmsg_frame::Tag;
use nowmsg_transport::CompletionMode;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a value into a frame and print it as hex.
    Encode(EncodeArgs),
    /// Decode a hex frame and print its contents.
    Decode(DecodeArgs),
    /// Run two loopback nodes and send values between them.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Payload type (int, short, long, float, double, byte, text, bool,
    /// record, unknown).
    #[arg(long = "type", short = 't', value_name = "TYPE", value_parser = parse_tag)]
    pub tag: Tag,
    /// Encode a single value as a one-element array.
    #[arg(long)]
    pub array: bool,
    /// Values. Text joins them with spaces; a record takes kind, text, int,
    /// float and flag; unknown takes hex bytes.
    #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
    pub values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex. Whitespace and ':' are ignored.
    #[arg(required = true, num_args = 1..)]
    pub hex: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CompletionArg {
    /// Report delivery and non-delivery.
    Report,
    /// Never report; every send times out.
    Silent,
    /// Deliver but report failure.
    Fail,
}

impl From<CompletionArg> for CompletionMode {
    fn from(arg: CompletionArg) -> Self {
        match arg {
            CompletionArg::Report => CompletionMode::Report,
            CompletionArg::Silent => CompletionMode::Silent,
            CompletionArg::Fail => CompletionMode::AlwaysFail,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Node configuration (JSON) applied to both stations.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Number of values to send.
    #[arg(long, default_value_t = 3)]
    pub count: u32,
    /// First value sent; each following send adds one.
    #[arg(long, default_value_t = 1234, allow_hyphen_values = true)]
    pub value: i32,
    /// Channel the receiving station listens on.
    #[arg(long, default_value_t = 6, allow_hyphen_values = true)]
    pub channel: i32,
    /// How the sending station reports completions.
    #[arg(long, value_enum, default_value = "report")]
    pub completion: CompletionArg,
    /// Send timeout override (e.g. 500ms, 2s).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_tag(input: &str) -> Result<Tag, String> {
    Tag::from_name(input).ok_or_else(|| {
        let names: Vec<&str> = Tag::ALL.iter().map(|tag| tag.name()).collect();
        format!("unknown type '{input}' (expected one of: {})", names.join(", "))
    })
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(
            parse_duration("500ms").unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("fast").unwrap_err().code, USAGE);
    }

    #[test]
    fn tag_names() {
        assert_eq!(parse_tag("Float"), Ok(Tag::Float));
        assert!(parse_tag("string").unwrap_err().contains("expected one of"));
    }
}
