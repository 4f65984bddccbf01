//! Gateway events
//!
//! Dispatch event names and the payloads the connection reads itself.

mod event_types;
mod payloads;

pub use event_types::GatewayEventType;
pub use payloads::{ReadyEvent, ReadySession};
