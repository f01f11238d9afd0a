use std::time::Duration;

use clap::{Args, Subcommand};
use wirecall::{CodecType, Network};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in demo services (Arith, Echo, Clock).
    Serve(ServeArgs),
    /// Make one call and print the reply.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind: `host:port` for tcp, a socket path for unix.
    #[arg(default_value = "127.0.0.1:7000")]
    pub address: String,
    /// Network to listen on (tcp, unix).
    #[arg(long, short = 'n', default_value = "tcp")]
    pub network: Network,
    /// Per-request limit applied when a client asks for none (e.g. 2s, 500ms, 0 for none).
    #[arg(long, default_value = "0")]
    pub handle_timeout: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Server address: `host:port` for tcp, a socket path for unix.
    pub address: String,
    /// Method to call, as `Service.Method`.
    pub method: String,
    /// Call argument as a JSON document.
    #[arg(long, short = 'a', default_value = "null")]
    pub args: String,
    /// Network to dial (tcp, unix).
    #[arg(long, short = 'n', default_value = "tcp")]
    pub network: Network,
    /// Body codec to negotiate.
    #[arg(long, default_value = "application/json")]
    pub codec: CodecType,
    /// Dial plus handshake limit (e.g. 5s, 500ms, 0 for none).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Client-side deadline for the reply (0 for none).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Server-side limit on the method itself (0 leaves it to the server).
    #[arg(long, default_value = "0")]
    pub handle_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds. Zero means no limit.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
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
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
