//! The server: accept loop, per-connection request loop, and dispatch.
//!
//! Each connection reads requests one after another but runs every invocation
//! on its own task, so requests on one connection may complete out of order.
//! Responses share a per-connection send lock. A connection waits for its
//! in-flight invocations before shutting down its write half.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};
use wirecall_codec::{
    CodecError, CodecReader, CodecRegistry, CodecWriter, FrameCodec, Header, DEFAULT_MAX_PAYLOAD,
};
use wirecall_transport::{RpcListener, RpcStream};

use crate::error::{RpcError, Result};
use crate::handshake::{handshake_frame_codec, handshake_server};
use crate::registry::ServiceRegistry;
use crate::service::{InvokeResult, MethodType, Service};

/// Prefix of the error a caller receives when its method overran the handle
/// timeout.
pub const HANDLE_TIMEOUT_PREFIX: &str = "rpc server: request handle timeout";

/// Default bound on the options exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-side settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Codecs clients may ask for.
    pub codecs: Arc<CodecRegistry>,
    /// How long a new connection may take to send its options.
    pub handshake_timeout: Duration,
    /// Handle timeout for clients that do not set one. Zero means no limit.
    pub handle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            codecs: Arc::new(CodecRegistry::standard()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl ServerConfig {
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }
}

type SharedWriter<W> = Arc<Mutex<CodecWriter<W>>>;

/// An RPC server. Clones share the registered services until one of them
/// registers more.
#[derive(Debug, Clone, Default)]
pub struct Server {
    services: Arc<ServiceRegistry>,
    config: ServerConfig,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            services: Arc::default(),
            config,
        }
    }

    /// Publish a service.
    ///
    /// Connections that are already being served keep the services they
    /// started with.
    pub fn register(&mut self, service: Service) -> Result<()> {
        Arc::make_mut(&mut self.services).register(service)
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until the listener fails, serving each on its own
    /// task.
    pub async fn accept(&self, listener: RpcListener) -> Result<()> {
        info!(
            network = %listener.network(),
            address = listener.local_addr(),
            services = self.services.len(),
            "rpc server accepting connections"
        );
        loop {
            let stream = match listener.accept().await {
                Ok(stream) => stream,
                Err(err) => {
                    error!(error = %err, "rpc server: accept error");
                    return Err(err.into());
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                let peer = stream.peer().to_string();
                if let Err(err) = server.serve_conn(stream).await {
                    warn!(%peer, error = %err, "rpc server: connection rejected");
                }
            });
        }
    }

    /// Serve one connection until the client goes away.
    ///
    /// Fails only if the handshake does; request-level problems are reported
    /// to the caller and logged.
    pub async fn serve_conn(&self, stream: RpcStream) -> Result<()> {
        let peer = stream.peer().to_string();
        self.serve_io(stream, peer).await
    }

    async fn serve_io<S>(&self, stream: S, peer: String) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let services = Arc::clone(&self.services);
        let (read_half, write_half) = split(stream);
        let mut framed_read = FramedRead::new(read_half, handshake_frame_codec());
        let mut framed_write = FramedWrite::new(write_half, FrameCodec::new());

        let handshake = handshake_server(&mut framed_read, &mut framed_write, &self.config.codecs);
        let (options, codec) = match tokio::time::timeout(self.config.handshake_timeout, handshake)
            .await
        {
            Ok(accepted) => accepted?,
            Err(_) => {
                return Err(RpcError::HandshakeFailed(format!(
                    "no options received within {:?}",
                    self.config.handshake_timeout
                )))
            }
        };
        framed_read
            .decoder_mut()
            .set_max_payload_size(DEFAULT_MAX_PAYLOAD);

        let handle_timeout = if options.handle_timeout.is_zero() {
            self.config.handle_timeout
        } else {
            options.handle_timeout
        };
        debug!(%peer, codec = %options.codec_type, ?handle_timeout, "connection established");

        let mut reader = CodecReader::from_framed(framed_read, Arc::clone(&codec));
        let writer: SharedWriter<_> = Arc::new(Mutex::new(CodecWriter::from_framed(framed_write, codec)));
        let mut handlers = JoinSet::new();

        loop {
            while handlers.try_join_next().is_some() {}

            let header = match reader.read_header().await {
                Ok(header) => header,
                Err(CodecError::ConnectionClosed) => break,
                Err(err) => {
                    warn!(%peer, error = %err, "rpc server: read header error");
                    break;
                }
            };
            let body = match reader.read_body().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(%peer, seq = header.seq, error = %err, "rpc server: read body error");
                    break;
                }
            };

            let method = match services.find(&header.service_method) {
                Ok((_, method)) => method,
                Err(err) => {
                    debug!(%peer, seq = header.seq, error = %err, "rejecting request");
                    send_response(&writer, header, Err(err.to_string())).await;
                    continue;
                }
            };
            let argv = match reader.decode_body(&body) {
                Ok(argv) => argv,
                Err(err) => {
                    let message = format!("rpc server: read argv err: {err}");
                    send_response(&writer, header, Err(message)).await;
                    continue;
                }
            };

            handlers.spawn(handle_request(
                Arc::clone(&writer),
                header,
                method,
                argv,
                handle_timeout,
            ));
        }

        while handlers.join_next().await.is_some() {}
        writer.lock().await.close().await;
        debug!(%peer, "connection closed");
        Ok(())
    }
}

/// Invoke `method` and write its response, bounded by `timeout`.
///
/// The invocation runs on its own task and reports through a oneshot, so a
/// panic or an overrun surfaces as an error for this call only. After a
/// timeout the invocation is aborted and can never write a second response.
async fn handle_request<W>(
    writer: SharedWriter<W>,
    header: Header,
    method: Arc<MethodType>,
    argv: Value,
    timeout: Duration,
) where
    W: AsyncWrite + Unpin + Send,
{
    let (tx, rx) = oneshot::channel::<InvokeResult>();
    let invocation = tokio::spawn(async move {
        let _ = tx.send(method.call(argv).await);
    });

    let panicked = || format!("rpc server: method {} panicked", header.service_method);
    let outcome = if timeout.is_zero() {
        rx.await.unwrap_or_else(|_| Err(panicked()))
    } else {
        match tokio::time::timeout(timeout, rx).await {
            Ok(delivered) => delivered.unwrap_or_else(|_| Err(panicked())),
            Err(_) => {
                invocation.abort();
                Err(format!("{HANDLE_TIMEOUT_PREFIX}: expect within {timeout:?}"))
            }
        }
    };

    send_response(&writer, header, outcome).await;
}

async fn send_response<W>(writer: &SharedWriter<W>, mut header: Header, outcome: InvokeResult)
where
    W: AsyncWrite + Unpin,
{
    let body = match outcome {
        Ok(reply) => {
            header.error.clear();
            reply
        }
        Err(message) => {
            header.error = message;
            Value::Null
        }
    };

    let mut writer = writer.lock().await;
    if let Err(err) = writer.write(&header, &body).await {
        error!(
            seq = header.seq,
            service_method = %header.service_method,
            error = %err,
            "rpc server: write response error"
        );
    }
}

#[cfg(test)]
mod tests {
    use futures_util::SinkExt;
    use serde_json::json;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
    use wirecall_codec::{Codec, CodecType, Frame, JsonCodec, BODY, HEADER};

    use super::*;
    use crate::handshake::handshake_client;
    use crate::options::Options;

    type TestConn = (
        CodecReader<ReadHalf<DuplexStream>>,
        CodecWriter<WriteHalf<DuplexStream>>,
    );

    fn test_server() -> Server {
        let mut server = Server::new();
        server
            .register(
                Service::builder("Arith")
                    .method("Sum", |args: Vec<i64>| async move {
                        Ok::<_, String>(args.iter().sum::<i64>())
                    })
                    .method("Fail", |_: ()| async move { Err::<(), _>("always fails") })
                    .method("Panic", |_: ()| async move {
                        if true {
                            panic!("method blew up");
                        }
                        Ok::<(), String>(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        server
            .register(
                Service::builder("Clock")
                    .method("Sleep", |ms: u64| async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        Ok::<_, String>(ms)
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        server
    }

    async fn connect(server: &Server, options: Options) -> TestConn {
        let (client, server_end) = duplex(64 * 1024);
        let server = server.clone();
        tokio::spawn(async move { server.serve_io(server_end, "test".to_string()).await });

        let (read_half, write_half) = split(client);
        let mut framed_read = FramedRead::new(read_half, handshake_frame_codec());
        let mut framed_write = FramedWrite::new(write_half, FrameCodec::new());
        handshake_client(&mut framed_read, &mut framed_write, &options)
            .await
            .unwrap();
        framed_read.decoder_mut().set_max_payload_size(DEFAULT_MAX_PAYLOAD);
        (
            CodecReader::from_framed(framed_read, Arc::new(JsonCodec)),
            CodecWriter::from_framed(framed_write, Arc::new(JsonCodec)),
        )
    }

    fn json_options() -> Options {
        Options::default().with_codec_type(CodecType::JSON)
    }

    async fn roundtrip(conn: &mut TestConn, method: &str, seq: u64, args: Value) -> (Header, Value) {
        conn.1.write(&Header::request(method, seq), &args).await.unwrap();
        let header = conn.0.read_header().await.unwrap();
        let body = conn.0.read_body().await.unwrap();
        (header, conn.0.decode_body(&body).unwrap())
    }

    #[tokio::test]
    async fn sum_round_trip() {
        let mut conn = connect(&test_server(), json_options()).await;
        let (header, reply) = roundtrip(&mut conn, "Arith.Sum", 1, json!([1, 2, 3])).await;
        assert_eq!(header.seq, 1);
        assert!(!header.is_error());
        assert_eq!(reply, json!(6));
    }

    #[tokio::test]
    async fn lookup_failures_are_per_call() {
        let mut conn = connect(&test_server(), json_options()).await;

        let (header, reply) = roundtrip(&mut conn, "Nope.Sum", 1, json!([1])).await;
        assert_eq!(header.error, "rpc server: can't find service Nope");
        assert_eq!(reply, Value::Null);

        let (header, _) = roundtrip(&mut conn, "Arith.Nope", 2, json!([1])).await;
        assert_eq!(header.error, "rpc server: can't find method Nope");

        let (header, _) = roundtrip(&mut conn, "ArithSum", 3, json!([1])).await;
        assert_eq!(header.error, "rpc server: service/method request ill-formed: ArithSum");

        let (header, reply) = roundtrip(&mut conn, "Arith.Sum", 4, json!([2, 2])).await;
        assert!(!header.is_error());
        assert_eq!(reply, json!(4));
    }

    #[tokio::test]
    async fn method_errors_and_bad_arguments_reach_caller() {
        let mut conn = connect(&test_server(), json_options()).await;

        let (header, _) = roundtrip(&mut conn, "Arith.Fail", 1, Value::Null).await;
        assert_eq!(header.error, "always fails");

        let (header, _) = roundtrip(&mut conn, "Arith.Sum", 2, json!("not a list")).await;
        assert!(header.error.starts_with("rpc server: read argv err:"), "{}", header.error);
    }

    #[tokio::test]
    async fn undecodable_body_does_not_close_connection() {
        let (client, server_end) = duplex(64 * 1024);
        let server = test_server();
        tokio::spawn(async move { server.serve_io(server_end, "test".to_string()).await });

        let (read_half, write_half) = split(client);
        let mut framed_read = FramedRead::new(read_half, handshake_frame_codec());
        let mut framed_write = FramedWrite::new(write_half, FrameCodec::new());
        handshake_client(&mut framed_read, &mut framed_write, &json_options())
            .await
            .unwrap();

        let header = JsonCodec.encode_header(&Header::request("Arith.Sum", 1)).unwrap();
        framed_write.send(Frame::new(HEADER, header)).await.unwrap();
        framed_write
            .send(Frame::new(BODY, &b"{oops"[..]))
            .await
            .unwrap();

        let mut conn: TestConn = (
            CodecReader::from_framed(framed_read, Arc::new(JsonCodec)),
            CodecWriter::from_framed(framed_write, Arc::new(JsonCodec)),
        );
        let header = conn.0.read_header().await.unwrap();
        conn.0.discard_body().await.unwrap();
        assert_eq!(header.seq, 1);
        assert!(header.error.starts_with("rpc server: read argv err:"), "{}", header.error);

        let (header, reply) = roundtrip(&mut conn, "Arith.Sum", 2, json!([5])).await;
        assert!(!header.is_error());
        assert_eq!(reply, json!(5));
    }

    #[tokio::test]
    async fn panic_is_reported_and_connection_survives() {
        let mut conn = connect(&test_server(), json_options()).await;

        let (header, _) = roundtrip(&mut conn, "Arith.Panic", 1, Value::Null).await;
        assert_eq!(header.error, "rpc server: method Arith.Panic panicked");

        let (header, reply) = roundtrip(&mut conn, "Arith.Sum", 2, json!([1, 1])).await;
        assert!(!header.is_error());
        assert_eq!(reply, json!(2));
    }

    #[tokio::test]
    async fn handle_timeout_answers_without_waiting() {
        let options = json_options().with_handle_timeout(Duration::from_millis(50));
        let mut conn = connect(&test_server(), options).await;

        conn.1
            .write(&Header::request("Clock.Sleep", 1), &json!(10_000))
            .await
            .unwrap();
        conn.1
            .write(&Header::request("Clock.Sleep", 2), &json!(1))
            .await
            .unwrap();

        let mut replies = Vec::new();
        for _ in 0..2 {
            let header = conn.0.read_header().await.unwrap();
            conn.0.discard_body().await.unwrap();
            replies.push(header);
        }
        replies.sort_by_key(|h| h.seq);

        assert!(!replies[1].is_error());
        assert_eq!(
            replies[0].error,
            "rpc server: request handle timeout: expect within 50ms"
        );
    }

    #[tokio::test]
    async fn server_default_handle_timeout_applies() {
        let mut server = test_server();
        server.config = ServerConfig::default().with_handle_timeout(Duration::from_millis(20));
        let mut conn = connect(&server, json_options()).await;

        let (header, _) = roundtrip(&mut conn, "Clock.Sleep", 1, json!(5_000)).await;
        assert!(header.error.starts_with(HANDLE_TIMEOUT_PREFIX));
    }

    #[tokio::test]
    async fn rejected_handshake_closes_connection() {
        let (client, server_end) = duplex(4096);
        let server = test_server();
        let served =
            tokio::spawn(async move { server.serve_io(server_end, "test".to_string()).await });

        let (read_half, write_half) = split(client);
        let mut framed_read = FramedRead::new(read_half, handshake_frame_codec());
        let mut framed_write = FramedWrite::new(write_half, FrameCodec::new());
        let options = Options::default().with_codec_type(CodecType::new("application/gob"));
        let err = handshake_client(&mut framed_read, &mut framed_write, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::HandshakeFailed(_)));

        let served = served.await.unwrap().unwrap_err();
        assert!(served.to_string().contains("invalid codec type application/gob"));
    }

    #[tokio::test]
    async fn silent_client_hits_handshake_timeout() {
        let (mut client, server_end) = duplex(4096);
        let server = Server::with_config(
            ServerConfig::default().with_handshake_timeout(Duration::from_millis(20)),
        );
        let err = server
            .serve_io(server_end, "test".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::HandshakeFailed(ref msg) if msg.contains("no options")));
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn in_flight_calls_finish_before_close() {
        let mut conn = connect(&test_server(), json_options()).await;
        conn.1
            .write(&Header::request("Clock.Sleep", 7), &json!(30))
            .await
            .unwrap();
        // Half-close our side: the server stops reading but still answers.
        conn.1.close().await;

        let header = conn.0.read_header().await.unwrap();
        assert_eq!(header.seq, 7);
        let body = conn.0.read_body().await.unwrap();
        assert_eq!(conn.0.decode_body(&body).unwrap(), json!(30));
        assert!(matches!(
            conn.0.read_header().await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[test]
    fn register_is_copy_on_write() {
        let mut server = test_server();
        let snapshot = server.clone();
        server
            .register(
                Service::builder("Echo")
                    .method("Say", |s: String| async move { Ok::<_, String>(s) })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(server.services().get("Echo").is_some());
        assert!(snapshot.services().get("Echo").is_none());
        assert!(matches!(
            server.register(
                Service::builder("Echo")
                    .method("Say", |s: String| async move { Ok::<_, String>(s) })
                    .build()
                    .unwrap()
            ),
            Err(RpcError::DuplicateService(_))
        ));
    }
}
