use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{CodecError, Result};
use crate::kind::{BODY, HEADER};

/// Frame header: magic (2) + length (4) + kind (2) = 8 bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Magic bytes: "WC" (0x57 0x43).
pub const MAGIC: [u8; 2] = [0x57, 0x43];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A single frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the payload holds (see [`crate::kind`]).
    pub kind: u16,
    /// The encoded value.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// An encoded header and body, written back to back as one sink item.
///
/// Handing both frames to the sink at once means a cancelled or failed send can
/// never leave a header on the wire without its body.
#[derive(Debug, Clone)]
pub struct FramedMessage {
    pub header: Bytes,
    pub body: Bytes,
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Kind     │ Payload          │
/// │ 0x57 0x43    │ (4B LE)  │ (2B LE)  │ (Length bytes)   │
/// │ "WC"         │          │          │                  │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(FRAME_HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_u16_le(kind);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let kind = u16::from_le_bytes([src[6], src[7]]);

    if payload_len > max_payload {
        return Err(CodecError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = FRAME_HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(FRAME_HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { kind, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// `tokio_util` codec for wirecall frames.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: FrameConfig,
}

impl FrameCodec {
    /// Create a frame codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Update maximum payload size for subsequent frames.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn check_size(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(CodecError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(CodecError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        self.check_size(&frame.payload)?;
        encode_frame(frame.kind, &frame.payload, dst)
    }
}

impl Encoder<FramedMessage> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, message: FramedMessage, dst: &mut BytesMut) -> Result<()> {
        self.check_size(&message.header)?;
        self.check_size(&message.body)?;
        encode_frame(HEADER, &message.header, dst)?;
        encode_frame(BODY, &message.body, dst)
    }
}
