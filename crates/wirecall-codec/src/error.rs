/// Errors that can occur while framing or encoding values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5743 \"WC\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame of the wrong kind arrived; the stream is out of step.
    #[error("unexpected {got} frame (expected {expected})")]
    UnexpectedFrame {
        expected: &'static str,
        got: &'static str,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// JSON serialization/deserialization error.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack serialization error.
    #[error("msgpack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error.
    #[error("msgpack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// No codec is registered under the requested type.
    #[error("invalid codec type {0}")]
    UnknownCodec(String),
}

impl CodecError {
    /// True when the error means the byte stream itself is unusable, as opposed
    /// to a single value that failed to encode or decode.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidMagic
                | CodecError::PayloadTooLarge { .. }
                | CodecError::UnexpectedFrame { .. }
                | CodecError::Io(_)
                | CodecError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
