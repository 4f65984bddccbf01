//! Gateway connection
//!
//! Socket lifecycle, session state, heartbeats and the bootstrap seam.

mod bootstrap;
mod connection;
mod handle;
mod heartbeat;
mod options;
mod session;
mod status;

pub use bootstrap::{ConnectionMetadata, GatewayBootstrap, SessionStartLimit, StaticBootstrap};
pub use connection::GatewayConnection;
pub use handle::GatewayHandle;
pub use heartbeat::{first_delay, HeartbeatHandle, HeartbeatScheduler, HeartbeatStats};
pub use options::GatewayOptions;
pub use session::{SessionState, SessionStore};
pub use status::ConnectionStatus;
