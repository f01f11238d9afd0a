//! The client: one connection, many concurrent calls.
//!
//! Requests are written under a send lock so header and body frames from
//! different callers never interleave. A single receive task reads responses
//! and hands each one to the call registered under its sequence number.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wirecall_codec::{
    Codec, CodecError, CodecReader, CodecRegistry, CodecWriter, FrameCodec, Header,
    DEFAULT_MAX_PAYLOAD,
};
use wirecall_transport::{Network, RpcStream};

use crate::call::Call;
use crate::error::{RpcError, Result};
use crate::handshake::{handshake_client, handshake_frame_codec};
use crate::options::Options;
use crate::pending::CallRegistry;

type Reader = CodecReader<ReadHalf<RpcStream>>;
type Writer = CodecWriter<WriteHalf<RpcStream>>;

/// Client-side settings that are not sent to the server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Codecs the client may announce.
    pub codecs: Arc<CodecRegistry>,
    /// Ceiling on outstanding calls, including ones whose caller gave up.
    /// `None` means unbounded.
    pub max_pending_calls: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            codecs: Arc::new(CodecRegistry::standard()),
            max_pending_calls: None,
        }
    }
}

impl ClientConfig {
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    pub fn with_max_pending_calls(mut self, max: usize) -> Self {
        self.max_pending_calls = Some(max);
        self
    }
}

/// Dial `address` and complete the handshake with default client settings.
pub async fn dial(network: Network, address: &str, options: Options) -> Result<Client> {
    dial_with_config(network, address, options, &ClientConfig::default()).await
}

/// Dial `address` and complete the handshake, bounded by the connect timeout.
///
/// The codec is resolved before any connection is opened, so an unknown codec
/// type fails without touching the network.
pub async fn dial_with_config(
    network: Network,
    address: &str,
    options: Options,
    config: &ClientConfig,
) -> Result<Client> {
    let options = options.normalized();
    let codec = config.codecs.resolve(&options.codec_type)?;
    let connect_timeout = options.connect_timeout;
    let address = address.to_string();
    let max_pending = config.max_pending_calls;

    dial_timeout(connect_timeout, async move {
        let stream = RpcStream::connect(network, &address).await?;
        Client::start(stream, options, codec, max_pending).await
    })
    .await
}

/// Run `connect` on its own task and give up after `timeout`.
///
/// On timeout the task is aborted, which drops any half-established
/// connection. A zero timeout waits indefinitely.
async fn dial_timeout<F>(timeout: Duration, connect: F) -> Result<Client>
where
    F: Future<Output = Result<Client>> + Send + 'static,
{
    let task = tokio::spawn(connect);
    if timeout.is_zero() {
        return join_dial(task.await);
    }

    let abort = task.abort_handle();
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => join_dial(joined),
        Err(_) => {
            abort.abort();
            debug!(?timeout, "dial abandoned");
            Err(RpcError::ConnectTimeout(timeout))
        }
    }
}

fn join_dial(joined: std::result::Result<Result<Client>, tokio::task::JoinError>) -> Result<Client> {
    joined.map_err(|err| RpcError::HandshakeFailed(format!("dial task failed: {err}")))?
}

struct Shared {
    registry: CallRegistry,
    writer: Mutex<Writer>,
    closed: CancellationToken,
    peer: String,
}

/// An RPC client bound to one connection.
///
/// Share it between tasks behind an `Arc`. Dropping the client stops its
/// receive task and releases the connection.
pub struct Client {
    shared: Arc<Shared>,
    options: Options,
}

impl Client {
    /// Run the handshake over an already-connected stream.
    pub async fn new(stream: RpcStream, options: Options, config: &ClientConfig) -> Result<Self> {
        let options = options.normalized();
        let codec = config.codecs.resolve(&options.codec_type)?;
        Self::start(stream, options, codec, config.max_pending_calls).await
    }

    async fn start(
        stream: RpcStream,
        options: Options,
        codec: Arc<dyn Codec>,
        max_pending: Option<usize>,
    ) -> Result<Self> {
        let peer = stream.peer().to_string();
        let (read_half, write_half) = split(stream);
        let mut framed_read = FramedRead::new(read_half, handshake_frame_codec());
        let mut framed_write = FramedWrite::new(write_half, FrameCodec::new());

        let options = handshake_client(&mut framed_read, &mut framed_write, &options).await?;
        framed_read
            .decoder_mut()
            .set_max_payload_size(DEFAULT_MAX_PAYLOAD);

        let reader = CodecReader::from_framed(framed_read, Arc::clone(&codec));
        let writer = CodecWriter::from_framed(framed_write, codec);
        let shared = Arc::new(Shared {
            registry: CallRegistry::new(max_pending),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
            peer,
        });

        tokio::spawn(receive(Arc::clone(&shared), reader));
        debug!(peer = %shared.peer, codec = %options.codec_type, "client connected");
        Ok(Self { shared, options })
    }

    /// Start a call and return its handle without waiting for the reply.
    ///
    /// Registration, argument encoding and write failures are all reported
    /// through [`Call::done`]. Dropping this future before the request is
    /// written releases the call's registration.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = match serde_json::to_value(args) {
            Ok(body) => body,
            Err(err) => return Call::failed(service_method, err.into()),
        };

        let (seq, rx) = match self.shared.registry.register(service_method) {
            Ok(registered) => registered,
            Err(err) => return Call::failed(service_method, err),
        };
        let mut registration = Registration {
            registry: &self.shared.registry,
            seq,
            armed: true,
        };

        let sent = self.send(seq, service_method, &body).await;
        registration.armed = false;
        if let Err(err) = sent {
            // The response may have raced in; only fail the call if it is still ours.
            if let Some(pending) = self.shared.registry.remove(seq) {
                pending.complete(Err(err));
            }
        }
        Call::new(seq, service_method, rx)
    }

    /// Call and wait until the reply arrives or `cancel` fires.
    ///
    /// The token is observed while the request is still being written too.
    /// A call cancelled after its request went out stays registered until its
    /// response or the end of the connection.
    pub async fn call<A, R>(
        &self,
        cancel: &CancellationToken,
        service_method: &str,
        args: &A,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tokio::select! {
            biased;
            result = async { self.go(service_method, args).await.done().await } => result,
            _ = cancel.cancelled() => Err(RpcError::Cancelled),
        }
    }

    /// Call and wait at most `timeout` for the request to be written and the
    /// reply to arrive. Zero means no deadline.
    pub async fn call_timeout<A, R>(
        &self,
        timeout: Duration,
        service_method: &str,
        args: &A,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let call = async { self.go(service_method, args).await.done().await };
        if timeout.is_zero() {
            return call.await;
        }
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| RpcError::DeadlineExceeded(timeout))?
    }

    /// Close the connection. Pending calls fail with [`RpcError::Shutdown`].
    ///
    /// Only the first close succeeds; later ones return `Shutdown`.
    pub async fn close(&self) -> Result<()> {
        self.shared.registry.close()?;
        // Wakes any send stalled on a peer that stopped reading.
        self.shared.closed.cancel();
        self.shared.writer.lock().await.abort().await;
        debug!(peer = %self.shared.peer, "client closed");
        Ok(())
    }

    /// False once the client was closed or its connection failed.
    pub fn is_available(&self) -> bool {
        self.shared.registry.is_available()
    }

    /// Number of calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.registry.len()
    }

    /// The options accepted by the server.
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Write one request, giving up as soon as the client shuts down.
    async fn send(&self, seq: u64, service_method: &str, body: &Value) -> Result<()> {
        let header = Header::request(service_method, seq);
        let write = async {
            let mut writer = self.shared.writer.lock().await;
            writer.write(&header, body).await
        };
        tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => Err(RpcError::Shutdown),
            written = write => Ok(written?),
        }
    }
}

/// Releases a registered call whose request never finished writing.
struct Registration<'a> {
    registry: &'a CallRegistry,
    seq: u64,
    armed: bool,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed && self.registry.remove(self.seq).is_some() {
            debug!(seq = self.seq, "call abandoned before its request was written");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.closed.cancel();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.shared.peer)
            .field("codec", &self.options.codec_type)
            .field("available", &self.is_available())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

/// Receive loop: runs for the life of the connection.
async fn receive(shared: Arc<Shared>, mut reader: Reader) {
    let err = loop {
        let step = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break RpcError::Shutdown,
            step = read_response(&shared, &mut reader) => step,
        };
        if let Err(err) = step {
            break err;
        }
    };
    terminate_calls(&shared, err).await;
}

/// Read one response and deliver it.
async fn read_response(shared: &Shared, reader: &mut Reader) -> Result<()> {
    let header = reader.read_header().await?;
    let Some(pending) = shared.registry.remove(header.seq) else {
        // Nobody is waiting for this seq; keep the stream aligned.
        debug!(seq = header.seq, "discarding response for unknown call");
        reader.discard_body().await?;
        return Ok(());
    };

    if header.is_error() {
        pending.complete(Err(RpcError::Server(header.error)));
        reader.discard_body().await?;
        return Ok(());
    }

    match reader.read_body().await {
        Ok(body) => {
            let reply = reader
                .decode_body(&body)
                .map_err(|err| RpcError::Decode(err.to_string()));
            pending.complete(reply);
            Ok(())
        }
        Err(err) => {
            pending.complete(Err(RpcError::Disconnected(err.to_string())));
            Err(err.into())
        }
    }
}

/// Fail every pending call and mark the client shut down.
///
/// Takes the send lock before the registry lock so no request can slip onto
/// the wire after this point.
async fn terminate_calls(shared: &Shared, err: RpcError) {
    shared.closed.cancel();
    let mut writer = shared.writer.lock().await;
    let closing = shared.registry.is_closing();
    let reason = err.to_string();
    let failed = shared.registry.terminate(|| {
        if closing {
            RpcError::Shutdown
        } else {
            RpcError::Disconnected(reason.clone())
        }
    });
    writer.abort().await;
    drop(writer);

    match err {
        RpcError::Shutdown | RpcError::Codec(CodecError::ConnectionClosed) => {
            debug!(peer = %shared.peer, failed, "connection finished");
        }
        _ if closing => debug!(peer = %shared.peer, failed, "connection finished"),
        _ => warn!(peer = %shared.peer, failed, error = %reason, "connection failed"),
    }
}
