use std::time::Duration;

use serde::{Deserialize, Serialize};
use wirecall_codec::CodecType;

/// Protocol identifier every handshake must carry.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Default bound on dial plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection options, sent once by the client as the first frame.
///
/// Timeouts travel as integer nanoseconds; zero means no limit. The magic
/// number and codec type are required on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Options {
    pub magic_number: u32,
    pub codec_type: CodecType,
    /// Bounds dial and handshake on the client.
    #[serde(with = "nanos", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Bounds each method invocation on the server.
    #[serde(with = "nanos", default)]
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl Options {
    pub fn with_codec_type(mut self, codec_type: CodecType) -> Self {
        self.codec_type = codec_type;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// Force the protocol magic number and fill in a missing codec type.
    pub fn normalized(mut self) -> Self {
        self.magic_number = MAGIC_NUMBER;
        if self.codec_type.is_empty() {
            self.codec_type = CodecType::default();
        }
        self
    }
}

mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
