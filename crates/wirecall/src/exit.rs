use std::fmt;

use wirecall::codec::CodecError;
use wirecall::transport::TransportError;
use wirecall::RpcError;

// Exit codes follow the sysexits / coreutils conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match &err {
        TransportError::UnsupportedNetwork(_) | TransportError::PathTooLong { .. } => USAGE,
        TransportError::Io(source) if source.kind() == std::io::ErrorKind::TimedOut => TIMEOUT,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    let code = match &err {
        CodecError::Io(_) | CodecError::ConnectionClosed => TRANSPORT_ERROR,
        CodecError::UnknownCodec(_) => USAGE,
        CodecError::PayloadTooLarge { .. } => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    if err.is_timeout() {
        return CliError::new(TIMEOUT, format!("{context}: {err}"));
    }
    match err {
        RpcError::Transport(err) => transport_error(context, err),
        RpcError::Codec(err) => codec_error(context, err),
        RpcError::Json(_) | RpcError::Decode(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RpcError::HandshakeFailed(_) | RpcError::Disconnected(_) | RpcError::Shutdown => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        RpcError::InvalidServiceName(_)
        | RpcError::NoMethods(_)
        | RpcError::DuplicateService(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
