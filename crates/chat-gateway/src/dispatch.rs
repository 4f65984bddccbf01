//! Dispatch seam
//!
//! The connection hands every Dispatch payload to a `DispatchSink`, in
//! arrival order, from a dedicated worker task.

use serde_json::Value;

/// One Dispatch payload (op 0)
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    /// Event name from `t`
    pub name: String,
    /// Sequence number from `s`
    pub sequence: Option<u64>,
    /// Event data from `d`
    pub data: Value,
}

impl DispatchEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            name: name.into(),
            sequence,
            data,
        }
    }
}

/// Receiver of dispatched events
///
/// Calls are serialized: the next event is not delivered before this call
/// returns. Implementations should hand long work off to another task.
pub trait DispatchSink: Send + Sync + 'static {
    fn dispatch(&self, event: DispatchEvent);
}

impl<F> DispatchSink for F
where
    F: Fn(DispatchEvent) + Send + Sync + 'static,
{
    fn dispatch(&self, event: DispatchEvent) {
        self(event);
    }
}
