//! Client-side table of outstanding calls.
//!
//! One lock guards the sequence counter, the pending map and the two
//! unavailability flags, so a sequence number is never observed half assigned
//! and a call is removed at most once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{RpcError, Result};

/// Completion signal for one call. Fires at most once.
pub(crate) type Completion = oneshot::Sender<Result<Value>>;

/// A registered call waiting for its response.
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub(crate) service_method: String,
    tx: Completion,
}

impl PendingCall {
    /// Deliver the outcome. A caller that stopped waiting simply never sees it.
    pub(crate) fn complete(self, result: Result<Value>) {
        let _ = self.tx.send(result);
    }
}

#[derive(Debug)]
struct State {
    seq: u64,
    pending: HashMap<u64, PendingCall>,
    closing: bool,
    shutdown: bool,
}

#[derive(Debug)]
pub(crate) struct CallRegistry {
    state: Mutex<State>,
    max_pending: Option<usize>,
}

impl CallRegistry {
    pub(crate) fn new(max_pending: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            max_pending,
        }
    }

    /// Assign the next sequence number and track the call under it.
    pub(crate) fn register(
        &self,
        service_method: &str,
    ) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let mut state = self.lock();
        if state.closing || state.shutdown {
            return Err(RpcError::Shutdown);
        }
        if let Some(max) = self.max_pending {
            if state.pending.len() >= max {
                return Err(RpcError::TooManyPendingCalls(max));
            }
        }

        let seq = state.seq;
        let (tx, rx) = oneshot::channel();
        state.pending.insert(
            seq,
            PendingCall {
                service_method: service_method.to_string(),
                tx,
            },
        );
        state.seq += 1;
        Ok((seq, rx))
    }

    pub(crate) fn remove(&self, seq: u64) -> Option<PendingCall> {
        self.lock().pending.remove(&seq)
    }

    /// Mark the client as shut down and fail every pending call.
    ///
    /// `error` builds the error each call receives. Returns how many calls were
    /// failed.
    pub(crate) fn terminate(&self, error: impl Fn() -> RpcError) -> usize {
        let drained: Vec<PendingCall> = {
            let mut state = self.lock();
            state.shutdown = true;
            state.pending.drain().map(|(_, call)| call).collect()
        };
        let count = drained.len();
        for call in drained {
            debug!(service_method = %call.service_method, "failing pending call");
            call.complete(Err(error()));
        }
        count
    }

    /// Mark the client as closing. Fails if it was already closing.
    pub(crate) fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if state.closing {
            return Err(RpcError::Shutdown);
        }
        state.closing = true;
        Ok(())
    }

    pub(crate) fn is_available(&self) -> bool {
        let state = self.lock();
        !state.closing && !state.shutdown
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.lock().closing
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic: every mutation is a single step.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
