use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Stream network kinds accepted by [`crate::RpcStream::connect`] and
/// [`crate::RpcListener::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// TCP over IPv4 or IPv6. The address is `host:port`.
    Tcp,
    /// Unix domain stream socket. The address is a filesystem path.
    Unix,
}

impl Network {
    /// Canonical network name.
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Unix => "unix",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(TransportError::UnsupportedNetwork(other.to_string())),
        }
    }
}
