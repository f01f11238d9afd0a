use std::time::Duration;

/// Errors surfaced by clients, servers and service registration.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error (dial, bind, accept).
    #[error("transport error: {0}")]
    Transport(#[from] wirecall_transport::TransportError),

    /// Frame or codec error.
    #[error("codec error: {0}")]
    Codec(#[from] wirecall_codec::CodecError),

    /// JSON conversion of a typed argument or reply.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The options exchange failed; the connection was not established.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connection failed while the call was pending.
    #[error("connection lost: {0}")]
    Disconnected(String),

    /// The client was closed or its connection already failed.
    #[error("connection is shut down")]
    Shutdown,

    /// Dial and handshake did not finish within the connect timeout.
    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    /// The caller's cancellation token fired before a reply arrived.
    #[error("rpc client: call cancelled")]
    Cancelled,

    /// The caller's deadline passed before a reply arrived.
    #[error("rpc client: call failed: deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The server reported a failure for this call.
    #[error("{0}")]
    Server(String),

    /// The reply body could not be decoded into the requested type.
    #[error("reading body {0}")]
    Decode(String),

    /// The client refused a new call because too many are outstanding.
    #[error("rpc client: too many pending calls (limit {0})")]
    TooManyPendingCalls(usize),

    /// A service was built without any usable method.
    #[error("rpc server: service {0} has no methods of suitable type")]
    NoMethods(String),

    /// A service with this name is already registered.
    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    /// The service name is not a valid identifier.
    #[error("rpc server: {0:?} is not a valid service name")]
    InvalidServiceName(String),
}

impl RpcError {
    /// True for errors raised by one of the three timeout domains.
    ///
    /// A handle timeout arrives as [`RpcError::Server`] and is recognized by its
    /// message.
    pub fn is_timeout(&self) -> bool {
        match self {
            RpcError::ConnectTimeout(_) | RpcError::DeadlineExceeded(_) => true,
            RpcError::Server(message) => message.starts_with(crate::server::HANDLE_TIMEOUT_PREFIX),
            _ => false,
        }
    }

    /// True when the error ended the connection rather than a single call.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_)
                | RpcError::HandshakeFailed(_)
                | RpcError::Disconnected(_)
                | RpcError::Shutdown
                | RpcError::ConnectTimeout(_)
        ) || matches!(self, RpcError::Codec(err) if err.is_fatal())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        assert!(RpcError::ConnectTimeout(Duration::from_secs(1)).is_timeout());
        assert!(RpcError::DeadlineExceeded(Duration::from_millis(5)).is_timeout());
        assert!(RpcError::Server(
            "rpc server: request handle timeout: expect within 1s".to_string()
        )
        .is_timeout());
        assert!(!RpcError::Server("boom".to_string()).is_timeout());
        assert!(!RpcError::Cancelled.is_timeout());
    }

    #[test]
    fn application_errors_are_not_connection_fatal() {
        assert!(!RpcError::Server("rpc server: can't find service Foo".to_string())
            .is_connection_fatal());
        assert!(!RpcError::Decode("invalid type".to_string()).is_connection_fatal());
        assert!(RpcError::Shutdown.is_connection_fatal());
        assert!(
            RpcError::Codec(wirecall_codec::CodecError::ConnectionClosed).is_connection_fatal()
        );
    }

    #[test]
    fn messages_match_wire_conventions() {
        assert_eq!(RpcError::Shutdown.to_string(), "connection is shut down");
        assert_eq!(
            RpcError::Decode("missing field".to_string()).to_string(),
            "reading body missing field"
        );
        assert_eq!(
            RpcError::Server("rpc server: can't find method Nope".to_string()).to_string(),
            "rpc server: can't find method Nope"
        );
    }
}
