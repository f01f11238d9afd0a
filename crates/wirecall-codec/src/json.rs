use bytes::Bytes;
use serde_json::Value;

use crate::codec::{Codec, CodecType};
use crate::error::Result;
use crate::header::Header;

/// Textual codec: headers and bodies as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn codec_type(&self) -> CodecType {
        CodecType::JSON
    }

    fn encode_header(&self, header: &Header) -> Result<Bytes> {
        Ok(serde_json::to_vec(header)?.into())
    }

    fn decode_header(&self, payload: &[u8]) -> Result<Header> {
        Ok(serde_json::from_slice(payload)?)
    }

    fn encode_body(&self, body: &Value) -> Result<Bytes> {
        Ok(serde_json::to_vec(body)?.into())
    }

    fn decode_body(&self, payload: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(payload)?)
    }
}
