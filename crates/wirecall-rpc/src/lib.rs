//! Client and server runtime for wirecall.
//!
//! A [`Client`] multiplexes many concurrent calls over one connection, matching
//! responses to calls by sequence number. A [`Server`] accepts connections,
//! dispatches `Service.Method` requests to registered [`Service`]s and writes
//! the replies back. Both sides agree on a codec in a one-shot handshake
//! ([`Options`]) before any request is sent.
//!
//! Three independent timeouts apply: the connect timeout bounds dial plus
//! handshake, a per-call deadline or cancellation token bounds how long a
//! caller waits, and the handle timeout bounds each method invocation on the
//! server.

pub mod call;
pub mod client;
pub mod error;
pub mod handshake;
pub mod options;
mod pending;
pub mod registry;
pub mod server;
pub mod service;

pub use call::Call;
pub use client::{dial, dial_with_config, Client, ClientConfig};
pub use error::{Result, RpcError};
pub use options::{Options, DEFAULT_CONNECT_TIMEOUT, MAGIC_NUMBER};
pub use registry::{LookupError, ServiceRegistry};
pub use server::{Server, ServerConfig, DEFAULT_HANDSHAKE_TIMEOUT, HANDLE_TIMEOUT_PREFIX};
pub use service::{MethodType, Service, ServiceBuilder};

pub use tokio_util::sync::CancellationToken;
