use std::sync::Arc;

use futures_util::SinkExt;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedWrite;
use tracing::debug;

use crate::codec::Codec;
use crate::error::{CodecError, Result};
use crate::frame::{FrameCodec, FramedMessage};
use crate::header::Header;

/// The write half of a connection once its codec is known.
///
/// Each [`write`](Self::write) puts a header frame and its body frame on the
/// wire as one sink item and flushes. Callers that share a writer between tasks
/// must serialize access themselves so messages never interleave.
pub struct CodecWriter<W> {
    framed: FramedWrite<W, FrameCodec>,
    codec: Arc<dyn Codec>,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> CodecWriter<W> {
    pub fn new(inner: W, codec: Arc<dyn Codec>) -> Self {
        Self::from_framed(FramedWrite::new(inner, FrameCodec::new()), codec)
    }

    /// Continue writing through an existing framed writer.
    pub fn from_framed(framed: FramedWrite<W, FrameCodec>, codec: Arc<dyn Codec>) -> Self {
        Self {
            framed,
            codec,
            closed: false,
        }
    }

    /// Encode and send one message.
    ///
    /// Both values are encoded before anything is written. Any failure closes
    /// the writer, since the peer can no longer trust what it reads from us.
    pub async fn write(&mut self, header: &Header, body: &Value) -> Result<()> {
        if self.closed {
            return Err(CodecError::ConnectionClosed);
        }

        let message = match self.encode(header, body) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, seq = header.seq, "encode failed; closing writer");
                self.close().await;
                return Err(err);
            }
        };

        if let Err(err) = self.framed.send(message).await {
            debug!(error = %err, seq = header.seq, "write failed; closing writer");
            self.close().await;
            return Err(err);
        }
        Ok(())
    }

    /// Flush and shut down the write half. Idempotent; errors are ignored.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = SinkExt::<FramedMessage>::close(&mut self.framed).await;
    }

    /// Shut down the write half without flushing.
    ///
    /// Bytes still buffered from an abandoned write are dropped, so this
    /// returns promptly even when the peer has stopped reading.
    pub async fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.framed.get_mut().shutdown().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    fn encode(&self, header: &Header, body: &Value) -> Result<FramedMessage> {
        Ok(FramedMessage {
            header: self.codec.encode_header(header)?,
            body: self.codec.encode_body(body)?,
        })
    }
}

impl<W> std::fmt::Debug for CodecWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecWriter")
            .field("codec", &self.codec.codec_type())
            .field("closed", &self.closed)
            .finish()
    }
}
