//! # chat-gateway
//!
//! Client side of the gateway protocol: a single logical session kept alive
//! across sockets with heartbeats, resume and reconnect.
//!
//! ## Example
//!
//! ```ignore
//! use chat_gateway::{DispatchEvent, GatewayConnection, GatewayOptions, StaticBootstrap};
//!
//! let options = GatewayOptions::new(token);
//! let connection = GatewayConnection::new(options, Arc::new(StaticBootstrap::new(url)));
//! let handle = connection.handle();
//!
//! tokio::spawn(connection.run(Arc::new(|event: DispatchEvent| {
//!     println!("{} #{:?}", event.name, event.sequence);
//! })));
//!
//! handle.close().await?;
//! ```

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;

pub use connection::{
    ConnectionMetadata, ConnectionStatus, GatewayBootstrap, GatewayConnection, GatewayHandle,
    GatewayOptions, HeartbeatScheduler, HeartbeatStats, SessionStartLimit, SessionState,
    SessionStore, StaticBootstrap,
};
pub use dispatch::{DispatchEvent, DispatchSink};
pub use error::{GatewayError, GatewayResult};
pub use events::{GatewayEventType, ReadyEvent, ReadySession};
pub use protocol::{
    Activity, CloseAction, CloseCode, GatewayPayload, IdentifyPayload, IdentifyProperties,
    OpCode, PresencePayload, ResumePayload, UserStatus,
};
