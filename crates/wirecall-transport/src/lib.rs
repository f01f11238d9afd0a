//! Byte-stream transport abstraction for wirecall.
//!
//! Provides a unified interface over the stream sockets an RPC connection can
//! run on:
//! - TCP (all platforms)
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of wirecall. Everything else builds on top of
//! the [`RpcStream`] and [`RpcListener`] types provided here.

pub mod error;
pub mod listener;
pub mod network;
pub mod stream;

pub use error::{Result, TransportError};
pub use listener::RpcListener;
pub use network::Network;
pub use stream::RpcStream;
