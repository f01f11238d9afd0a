use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("wirecall {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: wirecall");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("WIRECALL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("WIRECALL_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "magic_number: {:#x}",
        wirecall::rpc::MAGIC_NUMBER
    );
    let codecs = wirecall::codec::CodecRegistry::standard();
    let types: Vec<String> = codecs.types().iter().map(ToString::to_string).collect();
    println!("codecs: {}", types.join(", "));

    Ok(SUCCESS)
}
