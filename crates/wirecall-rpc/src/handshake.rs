//! The options exchange that opens every connection.
//!
//! The client writes its [`Options`] as a JSON `OPTION` frame before anything
//! else. The server checks the magic number and codec type, then echoes the
//! accepted options back in a second `OPTION` frame. A rejected client is
//! simply disconnected.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;
use wirecall_codec::kind::kind_name;
use wirecall_codec::{Codec, CodecError, CodecRegistry, Frame, FrameCodec, FrameConfig, OPTION};

use crate::error::{RpcError, Result};
use crate::options::{Options, MAGIC_NUMBER};

/// Cap on handshake frames, applied until the options are accepted.
pub const MAX_HANDSHAKE_PAYLOAD: usize = 16 * 1024;

/// Frame codec for a connection that has not completed its handshake.
pub fn handshake_frame_codec() -> FrameCodec {
    FrameCodec::with_config(FrameConfig {
        max_payload_size: MAX_HANDSHAKE_PAYLOAD,
    })
}

/// Send `options` and wait for the server's acknowledgement.
pub async fn handshake_client<R, W>(
    reader: &mut FramedRead<R, FrameCodec>,
    writer: &mut FramedWrite<W, FrameCodec>,
    options: &Options,
) -> Result<Options>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_options(writer, options).await?;

    let ack = recv_options(reader).await?;
    if ack.magic_number != options.magic_number || ack.codec_type != options.codec_type {
        return Err(RpcError::HandshakeFailed(format!(
            "server acknowledged different options (magic {:#x}, codec {})",
            ack.magic_number, ack.codec_type
        )));
    }
    debug!(codec = %ack.codec_type, "handshake complete");
    Ok(ack)
}

/// Read the client's options, validate them against `codecs`, and acknowledge.
///
/// Returns the accepted options together with the codec to use for the rest of
/// the connection.
pub async fn handshake_server<R, W>(
    reader: &mut FramedRead<R, FrameCodec>,
    writer: &mut FramedWrite<W, FrameCodec>,
    codecs: &CodecRegistry,
) -> Result<(Options, Arc<dyn Codec>)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let options = recv_options(reader).await?;
    let codec = validate(&options, codecs)?;
    send_options(writer, &options).await?;
    Ok((options, codec))
}

/// Check the magic number and resolve the requested codec.
pub fn validate(options: &Options, codecs: &CodecRegistry) -> Result<Arc<dyn Codec>> {
    if options.magic_number != MAGIC_NUMBER {
        return Err(RpcError::HandshakeFailed(format!(
            "rpc server: invalid magic number {:#x}",
            options.magic_number
        )));
    }
    codecs.get(&options.codec_type).ok_or_else(|| {
        RpcError::HandshakeFailed(format!(
            "rpc server: invalid codec type {}",
            options.codec_type
        ))
    })
}

async fn send_options<W: AsyncWrite + Unpin>(
    writer: &mut FramedWrite<W, FrameCodec>,
    options: &Options,
) -> Result<()> {
    let payload = serde_json::to_vec(options)?;
    writer.send(Frame::new(OPTION, payload)).await?;
    Ok(())
}

async fn recv_options<R: AsyncRead + Unpin>(
    reader: &mut FramedRead<R, FrameCodec>,
) -> Result<Options> {
    let frame = match reader.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(CodecError::ConnectionClosed)) | None => {
            return Err(RpcError::HandshakeFailed(
                "connection closed during handshake".to_string(),
            ))
        }
        Some(Err(CodecError::PayloadTooLarge { size, max })) => {
            return Err(RpcError::HandshakeFailed(format!(
                "handshake payload too large: {size} (max {max})"
            )))
        }
        Some(Err(err)) => return Err(err.into()),
    };

    if frame.kind != OPTION {
        return Err(RpcError::HandshakeFailed(format!(
            "expected option frame, got {}",
            kind_name(frame.kind)
        )));
    }

    serde_json::from_slice(&frame.payload)
        .map_err(|err| RpcError::HandshakeFailed(format!("rpc server: options error: {err}")))
}
