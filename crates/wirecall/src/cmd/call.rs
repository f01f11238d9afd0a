use serde_json::Value;
use tracing::debug;
use wirecall::{dial, Options};

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let argv: Value = serde_json::from_str(&args.args)
        .map_err(|err| CliError::usage(format!("--args is not valid JSON: {err}")))?;
    if !args.method.contains('.') {
        return Err(CliError::usage(format!(
            "method must be Service.Method, got {:?}",
            args.method
        )));
    }

    let options = Options::default()
        .with_codec_type(args.codec)
        .with_connect_timeout(parse_duration(&args.connect_timeout)?)
        .with_handle_timeout(parse_duration(&args.handle_timeout)?);
    let timeout = parse_duration(&args.timeout)?;

    let client = dial(args.network, &args.address, options)
        .await
        .map_err(|err| rpc_error("dial", err))?;
    debug!(peer = client.peer(), method = %args.method, "sending call");

    let result = client
        .call_timeout::<_, Value>(timeout, &args.method, &argv)
        .await;
    let _ = client.close().await;

    let reply = result.map_err(|err| rpc_error(&args.method, err))?;
    print_value(&reply, format);
    Ok(SUCCESS)
}
