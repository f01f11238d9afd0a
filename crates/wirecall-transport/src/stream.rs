use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::network::Network;

/// A connected byte stream: implements `AsyncRead + AsyncWrite`.
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps either a TCP stream or, on Unix, a Unix domain socket stream.
pub struct RpcStream {
    inner: StreamInner,
    peer: String,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl RpcStream {
    /// Connect to a listening peer.
    pub async fn connect(network: Network, address: &str) -> Result<Self> {
        match network {
            Network::Tcp => {
                let stream =
                    TcpStream::connect(address)
                        .await
                        .map_err(|source| TransportError::Connect {
                            address: address.to_string(),
                            source,
                        })?;
                // Requests are small and latency-bound.
                let _ = stream.set_nodelay(true);
                debug!(address, "connected over tcp");
                Ok(Self::from_tcp(stream))
            }
            #[cfg(unix)]
            Network::Unix => {
                let stream = tokio::net::UnixStream::connect(address)
                    .await
                    .map_err(|source| TransportError::Connect {
                        address: address.to_string(),
                        source,
                    })?;
                debug!(address, "connected to unix domain socket");
                Ok(Self {
                    inner: StreamInner::Unix(stream),
                    peer: address.to_string(),
                })
            }
            #[cfg(not(unix))]
            Network::Unix => Err(TransportError::UnsupportedNetwork(
                "unix (not available on this platform)".to_string(),
            )),
        }
    }

    /// Wrap an already-connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "tcp:unknown".to_string());
        Self {
            inner: StreamInner::Tcp(stream),
            peer,
        }
    }

    /// Wrap an already-connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: tokio::net::UnixStream) -> Self {
        let peer = stream
            .peer_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "unix:unnamed".to_string());
        Self {
            inner: StreamInner::Unix(stream),
            peer,
        }
    }

    /// Human-readable description of the remote end, used in log fields.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The network this stream runs over.
    pub fn network(&self) -> Network {
        match &self.inner {
            StreamInner::Tcp(_) => Network::Tcp,
            #[cfg(unix)]
            StreamInner::Unix(_) => Network::Unix,
        }
    }
}

impl AsyncRead for RpcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RpcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for RpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStream")
            .field("type", &self.network().as_str())
            .field("peer", &self.peer)
            .finish()
    }
}
