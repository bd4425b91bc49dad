use nowmsg_frame::{ARRAY_CAPACITY, FRAME_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("nowmsg {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: nowmsg");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("NOWMSG_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("frame_size: {FRAME_SIZE}");
    println!("array_capacity: {ARRAY_CAPACITY}");
    println!(
        "features: node=true, async={}, cli=true",
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
