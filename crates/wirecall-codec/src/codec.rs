//! The codec contract and the table of codecs a peer is willing to speak.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CodecError, Result};
use crate::header::Header;
use crate::json::JsonCodec;
use crate::msgpack::MsgPackCodec;

/// Encodes and decodes headers and bodies for one wire format.
///
/// Bodies cross this boundary as [`serde_json::Value`] so the trait stays
/// object safe; typed arguments and replies are converted at the call site.
/// Implementations must be stateless with respect to the stream: framing is
/// handled by [`crate::FrameCodec`], a codec only sees one payload at a time.
pub trait Codec: Send + Sync + fmt::Debug {
    /// The identifier announced during the handshake.
    fn codec_type(&self) -> CodecType;

    fn encode_header(&self, header: &Header) -> Result<Bytes>;

    fn decode_header(&self, payload: &[u8]) -> Result<Header>;

    fn encode_body(&self, body: &Value) -> Result<Bytes>;

    fn decode_body(&self, payload: &[u8]) -> Result<Value>;
}

/// Identifier of a wire format, e.g. `application/json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodecType(Cow<'static, str>);

impl CodecType {
    pub const JSON: CodecType = CodecType(Cow::Borrowed("application/json"));
    pub const MSGPACK: CodecType = CodecType(Cow::Borrowed("application/msgpack"));

    /// A codec type with an arbitrary name, for codecs registered by the user.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CodecType {
    fn default() -> Self {
        Self::MSGPACK
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CodecType {
    type Err = CodecError;

    /// Accepts the full media type or the short aliases `json` and `msgpack`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err(CodecError::UnknownCodec(s.to_string())),
            "json" | "application/json" => Ok(Self::JSON),
            "msgpack" | "messagepack" | "application/msgpack" => Ok(Self::MSGPACK),
            _ => Ok(Self::new(s.trim())),
        }
    }
}

/// Codec constructors keyed by [`CodecType`].
///
/// Clients use it to find the codec they announce; servers use it to check the
/// codec a client asked for.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<CodecType, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in JSON and MessagePack codecs.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(MsgPackCodec));
        registry
    }

    /// Add a codec under its own type, replacing any previous entry.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.codec_type(), codec);
    }

    pub fn get(&self, codec_type: &CodecType) -> Option<Arc<dyn Codec>> {
        self.codecs.get(codec_type).cloned()
    }

    /// Like [`Self::get`], but a missing codec is an error.
    pub fn resolve(&self, codec_type: &CodecType) -> Result<Arc<dyn Codec>> {
        self.get(codec_type)
            .ok_or_else(|| CodecError::UnknownCodec(codec_type.to_string()))
    }

    pub fn contains(&self, codec_type: &CodecType) -> bool {
        self.codecs.contains_key(codec_type)
    }

    /// Registered types, sorted for stable output.
    pub fn types(&self) -> Vec<CodecType> {
        let mut types: Vec<_> = self.codecs.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("types", &self.types())
            .finish()
    }
}
