use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{RpcError, Result};

/// Handle to an asynchronous call started with [`crate::Client::go`].
///
/// Every outcome is delivered through [`Call::done`], including failures that
/// happened before the request reached the wire.
#[must_use = "a call does nothing useful unless its result is awaited"]
pub struct Call<R> {
    seq: u64,
    service_method: String,
    rx: oneshot::Receiver<Result<Value>>,
    _reply: PhantomData<fn() -> R>,
}

impl<R> Call<R> {
    pub(crate) fn new(
        seq: u64,
        service_method: &str,
        rx: oneshot::Receiver<Result<Value>>,
    ) -> Self {
        Self {
            seq,
            service_method: service_method.to_string(),
            rx,
            _reply: PhantomData,
        }
    }

    /// A call that failed before it was registered. Its sequence number is 0.
    pub(crate) fn failed(service_method: &str, err: RpcError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(0, service_method, rx)
    }

    /// Sequence number on the wire; 0 if the call was never sent.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }
}

impl<R: DeserializeOwned> Call<R> {
    /// Wait for the reply and decode it.
    pub async fn done(self) -> Result<R> {
        let value = self.rx.await.map_err(|_| RpcError::Shutdown)??;
        serde_json::from_value(value).map_err(|err| RpcError::Decode(err.to_string()))
    }
}

impl<R> fmt::Debug for Call<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("seq", &self.seq)
            .field("service_method", &self.service_method)
            .finish()
    }
}
