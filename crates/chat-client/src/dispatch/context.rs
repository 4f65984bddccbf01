//! Dispatch context
//!
//! What a listener can reach while handling an event.

use crate::rest::RestClient;
use chat_cache::SharedCache;
use chat_gateway::{GatewayHandle, SessionState};
use std::sync::Arc;
use tokio::sync::watch;

/// Context passed to every listener
#[derive(Clone)]
pub struct DispatchContext {
    /// Event name
    pub event: String,
    /// Sequence number of the event
    pub sequence: Option<u64>,
    /// Session snapshot taken when the event was dispatched
    pub session: Arc<SessionState>,
    pub cache: SharedCache,
    pub rest: RestClient,
    pub gateway: GatewayHandle,
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("event", &self.event)
            .field("sequence", &self.sequence)
            .field("session_id", &self.session.session_id)
            .finish_non_exhaustive()
    }
}

/// Fires once per login, on the first READY
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Mark ready. Returns `true` only for the call that flipped the flag.
    pub fn signal(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            let first = !*ready;
            *ready = true;
            first
        })
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
