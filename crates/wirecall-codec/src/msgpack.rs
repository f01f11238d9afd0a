//! MessagePack codec using `rmp-serde`.
//!
//! Structs are written with `to_vec_named` (struct-as-map), so headers carry
//! their field names on the wire just as the JSON codec does.

use bytes::Bytes;
use serde_json::Value;

use crate::codec::{Codec, CodecType};
use crate::error::Result;
use crate::header::Header;

/// Binary codec: headers and bodies as MessagePack values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn codec_type(&self) -> CodecType {
        CodecType::MSGPACK
    }

    fn encode_header(&self, header: &Header) -> Result<Bytes> {
        Ok(rmp_serde::to_vec_named(header)?.into())
    }

    fn decode_header(&self, payload: &[u8]) -> Result<Header> {
        Ok(rmp_serde::from_slice(payload)?)
    }

    fn encode_body(&self, body: &Value) -> Result<Bytes> {
        Ok(rmp_serde::to_vec_named(body)?.into())
    }

    fn decode_body(&self, payload: &[u8]) -> Result<Value> {
        Ok(rmp_serde::from_slice(payload)?)
    }
}
