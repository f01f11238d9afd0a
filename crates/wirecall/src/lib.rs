//! A compact RPC runtime: typed calls multiplexed over one connection.
//!
//! A client dials a server, both sides agree on a codec in a one-shot
//! handshake, and from then on any number of concurrent calls share the
//! connection. Each call carries a sequence number so replies can arrive in
//! any order.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix domain socket streams and listeners
//! - [`codec`]: Wire frames, headers, and the JSON / MessagePack codecs
//! - [`rpc`]: Handshake, client, service registration and server
//!
//! ```no_run
//! use wirecall::{dial, CancellationToken, Network, Options, Server, Service};
//! use wirecall::transport::RpcListener;
//!
//! # async fn demo() -> wirecall::Result<()> {
//! let mut server = Server::new();
//! server.register(
//!     Service::builder("Arith")
//!         .method("Sum", |args: Vec<i64>| async move { Ok::<_, String>(args.iter().sum::<i64>()) })
//!         .build()?,
//! )?;
//! let listener = RpcListener::bind(Network::Tcp, "127.0.0.1:7000").await?;
//! tokio::spawn(async move { server.accept(listener).await });
//!
//! let client = dial(Network::Tcp, "127.0.0.1:7000", Options::default()).await?;
//! let sum: i64 = client.call(&CancellationToken::new(), "Arith.Sum", &[1, 2, 3]).await?;
//! assert_eq!(sum, 6);
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use wirecall_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use wirecall_codec::*;
}

/// Re-export client and server types.
pub mod rpc {
    pub use wirecall_rpc::*;
}

pub use wirecall_codec::CodecType;
pub use wirecall_rpc::{
    dial, dial_with_config, Call, CancellationToken, Client, ClientConfig, Options, Result,
    RpcError, Server, ServerConfig, Service,
};
pub use wirecall_transport::Network;
