//! Connection status

use std::fmt;

/// Lifecycle state of a gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// Created, not started
    #[default]
    Idle,
    /// Fetching metadata and opening the socket
    Connecting,
    /// Socket open, waiting for Hello
    AwaitingHello,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// READY or RESUMED received
    Connected,
    /// Socket closed, about to reconnect
    Reconnecting,
    /// Client-initiated close in progress
    Closing,
    /// Run loop finished
    Terminated,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Terminated => "terminated",
        }
    }

    /// Check if the run loop is active
    #[must_use]
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::Terminated)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
