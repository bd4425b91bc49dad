use nowmsg_frame::decode_frame;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{from_hex, print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = from_hex(&args.hex.concat())
        .ok_or_else(|| CliError::new(USAGE, "frame must be given as hex"))?;
    let msg = decode_frame(&raw).map_err(|err| frame_error("decode failed", err))?;
    let value = msg
        .to_value()
        .map_err(|err| frame_error("decode failed", err))?;
    print_frame(&msg, &value, format);
    Ok(SUCCESS)
}
