#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::network::Network;
use crate::stream::RpcStream;

/// A bound, listening socket that yields [`RpcStream`]s.
///
/// Unix domain sockets are created with owner-only permissions. A stale socket
/// file left at the path is removed on bind, and the file this listener created
/// is removed again on drop.
pub struct RpcListener {
    inner: ListenerInner,
    local_addr: String,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocketListener),
}

#[cfg(unix)]
struct UnixSocketListener {
    listener: tokio::net::UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl RpcListener {
    /// Default permission mode for created socket paths.
    #[cfg(unix)]
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(all(unix, not(target_os = "linux")))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `address` using `network`.
    ///
    /// For TCP, port `0` picks a free port; read it back via [`Self::local_addr`].
    pub async fn bind(network: Network, address: &str) -> Result<Self> {
        match network {
            Network::Tcp => {
                let listener =
                    TcpListener::bind(address)
                        .await
                        .map_err(|source| TransportError::Bind {
                            address: address.to_string(),
                            source,
                        })?;
                Self::from_tcp(listener)
            }
            #[cfg(unix)]
            Network::Unix => Self::bind_unix(address, Self::DEFAULT_SOCKET_MODE),
            #[cfg(not(unix))]
            Network::Unix => Err(TransportError::UnsupportedNetwork(
                "unix (not available on this platform)".to_string(),
            )),
        }
    }

    /// Adopt an already-bound TCP listener.
    pub fn from_tcp(listener: TcpListener) -> Result<Self> {
        let local_addr = listener.local_addr()?.to_string();
        info!(address = %local_addr, "listening on tcp");
        Ok(Self {
            inner: ListenerInner::Tcp(listener),
            local_addr,
        })
    }

    /// Bind a filesystem-path Unix domain socket with an explicit mode.
    ///
    /// If the path already exists and is a socket, it is removed first. Any other
    /// kind of file at the path is left alone and binding fails.
    #[cfg(unix)]
    pub fn bind_unix(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path: display,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            address: display.clone(),
            source,
        };

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = tokio::net::UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            inner: ListenerInner::Unix(UnixSocketListener {
                listener,
                path,
                created_inode: Some((created.dev(), created.ino())),
            }),
            local_addr: display,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<RpcStream> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().await.map_err(TransportError::Accept)?;
                let _ = stream.set_nodelay(true);
                debug!(peer = %addr, "accepted tcp connection");
                Ok(RpcStream::from_tcp(stream))
            }
            #[cfg(unix)]
            ListenerInner::Unix(unix) => {
                let (stream, _addr) = unix
                    .listener
                    .accept()
                    .await
                    .map_err(TransportError::Accept)?;
                debug!(path = ?unix.path, "accepted unix connection");
                Ok(RpcStream::from_unix(stream))
            }
        }
    }

    /// The bound address: `ip:port` for TCP, the socket path for Unix.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// The network this listener is bound on.
    pub fn network(&self) -> Network {
        match &self.inner {
            ListenerInner::Tcp(_) => Network::Tcp,
            #[cfg(unix)]
            ListenerInner::Unix(_) => Network::Unix,
        }
    }
}

#[cfg(unix)]
impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

impl std::fmt::Debug for RpcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcListener")
            .field("network", &self.network().as_str())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
