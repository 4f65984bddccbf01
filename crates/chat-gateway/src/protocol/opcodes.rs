//! Gateway operation codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the connection may send an op code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
    Both,
}

/// Op code of a payload; selects how `d` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    PresenceUpdate = 3,
    Resume = 6,
    Reconnect = 7,
    InvalidSession = 9,
    /// Carries the heartbeat interval
    Hello = 10,
    HeartbeatAck = 11,
}

/// Op code outside the known set
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown op code: {0}")]
pub struct UnknownOpCode(pub u8);

impl OpCode {
    pub const ALL: [Self; 9] = [
        Self::Dispatch,
        Self::Heartbeat,
        Self::Identify,
        Self::PresenceUpdate,
        Self::Resume,
        Self::Reconnect,
        Self::InvalidSession,
        Self::Hello,
        Self::HeartbeatAck,
    ];

    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Heartbeat => Direction::Both,
            Self::Identify | Self::PresenceUpdate | Self::Resume => Direction::Send,
            Self::Dispatch
            | Self::Reconnect
            | Self::InvalidSession
            | Self::Hello
            | Self::HeartbeatAck => Direction::Receive,
        }
    }

    /// Whether the server is allowed to send this op code
    #[must_use]
    pub const fn is_receivable(self) -> bool {
        !matches!(self.direction(), Direction::Send)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|op| u8::from(*op) == value)
            .ok_or(UnknownOpCode(value))
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), *self as u8)
    }
}
