use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::Codec;
use crate::error::{CodecError, Result};
use crate::frame::{Frame, FrameCodec};
use crate::header::Header;
use crate::kind::{kind_name, BODY, HEADER};

/// The read half of a connection once its codec is known.
///
/// Messages arrive as a header frame followed by one body frame. Partial reads
/// are handled by the underlying [`FramedRead`]; callers always see whole
/// frames.
pub struct CodecReader<R> {
    framed: FramedRead<R, FrameCodec>,
    codec: Arc<dyn Codec>,
}

impl<R: AsyncRead + Unpin> CodecReader<R> {
    /// Wrap a raw read half with a default frame codec.
    pub fn new(inner: R, codec: Arc<dyn Codec>) -> Self {
        Self::from_framed(FramedRead::new(inner, FrameCodec::new()), codec)
    }

    /// Continue reading from an existing framed reader.
    ///
    /// Bytes already buffered by `framed` (for example right after the
    /// handshake) are kept.
    pub fn from_framed(framed: FramedRead<R, FrameCodec>, codec: Arc<dyn Codec>) -> Self {
        Self { framed, codec }
    }

    /// Read the next frame of any kind.
    ///
    /// A stream that ends on a frame boundary yields
    /// [`CodecError::ConnectionClosed`] just like one that ends mid-frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        match self.framed.next().await {
            Some(frame) => frame,
            None => Err(CodecError::ConnectionClosed),
        }
    }

    /// Read and decode the next header.
    pub async fn read_header(&mut self) -> Result<Header> {
        let frame = self.expect_frame(HEADER).await?;
        self.codec.decode_header(&frame.payload)
    }

    /// Read the body frame that follows a header, without decoding it.
    ///
    /// The frame is always consumed, so the stream stays in step even if the
    /// caller then fails to decode the payload.
    pub async fn read_body(&mut self) -> Result<Bytes> {
        Ok(self.expect_frame(BODY).await?.payload)
    }

    /// Consume the body frame that follows a header and drop it.
    pub async fn discard_body(&mut self) -> Result<()> {
        self.read_body().await.map(|_| ())
    }

    /// Decode a payload returned by [`Self::read_body`].
    pub fn decode_body(&self, payload: &[u8]) -> Result<Value> {
        self.codec.decode_body(payload)
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Raise or lower the frame size limit for subsequent reads.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.framed.decoder_mut().set_max_payload_size(max_payload_size);
    }

    pub fn into_inner(self) -> R {
        self.framed.into_inner()
    }

    async fn expect_frame(&mut self, kind: u16) -> Result<Frame> {
        let frame = self.read_frame().await?;
        if frame.kind != kind {
            return Err(CodecError::UnexpectedFrame {
                expected: kind_name(kind),
                got: kind_name(frame.kind),
            });
        }
        Ok(frame)
    }
}

impl<R> std::fmt::Debug for CodecReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecReader")
            .field("codec", &self.codec.codec_type())
            .finish()
    }
}
