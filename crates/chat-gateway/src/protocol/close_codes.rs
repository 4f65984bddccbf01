//! WebSocket close codes
//!
//! Gateway close codes and the reconnect decision derived from them.

use serde::{Deserialize, Serialize};

/// Normal closure, the session is over
pub const NORMAL_CLOSE: u16 = 1000;

/// Client-side marker for "invalid session, not resumable"
pub const FRESH_RECONNECT: u16 = 3000;

/// Gateway close codes sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    InvalidSequence = 4007,
    RateLimited = 4008,
    SessionTimedOut = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
    InvalidIntents = 4013,
    DisallowedIntents = 4014,
}

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimedOut),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error",
            Self::UnknownOpcode => "Unknown opcode",
            Self::DecodeError => "Decode error",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSequence => "Invalid sequence number",
            Self::RateLimited => "Rate limited",
            Self::SessionTimedOut => "Session timed out",
            Self::InvalidShard => "Invalid shard",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidApiVersion => "Invalid API version",
            Self::InvalidIntents => "Invalid intents",
            Self::DisallowedIntents => "Disallowed intents",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// What the connection does after the socket closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Stop, the session ended normally
    Terminate,
    /// Drop resume state and identify again
    ReconnectFresh,
    /// Reconnect to the resume URL and resume the session
    Resume,
    /// Stop with an error, retrying cannot help
    Fatal,
}

impl CloseAction {
    /// Classify a close code. A missing code counts as an abnormal closure.
    #[must_use]
    pub fn classify(code: Option<u16>) -> Self {
        match code {
            Some(NORMAL_CLOSE) => Self::Terminate,
            Some(FRESH_RECONNECT) => Self::ReconnectFresh,
            Some(4004) | Some(4010..=4014) => Self::Fatal,
            _ => Self::Resume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_from_u16() {
        assert_eq!(CloseCode::from_u16(4000), Some(CloseCode::UnknownError));
        assert_eq!(CloseCode::from_u16(4004), Some(CloseCode::AuthenticationFailed));
        assert_eq!(CloseCode::from_u16(4014), Some(CloseCode::DisallowedIntents));
        assert_eq!(CloseCode::from_u16(4006), None);
        assert_eq!(CloseCode::from_u16(1000), None);
    }

    #[test]
    fn test_classify_terminal_and_fresh() {
        assert_eq!(CloseAction::classify(Some(1000)), CloseAction::Terminate);
        assert_eq!(CloseAction::classify(Some(3000)), CloseAction::ReconnectFresh);
    }

    #[test]
    fn test_classify_resumable_range() {
        for code in (4000..=4009).filter(|code| *code != 4004) {
            assert_eq!(CloseAction::classify(Some(code)), CloseAction::Resume, "{code}");
        }
    }

    #[test]
    fn test_classify_fatal() {
        assert_eq!(CloseAction::classify(Some(4004)), CloseAction::Fatal);
        for code in 4010..=4014 {
            assert_eq!(CloseAction::classify(Some(code)), CloseAction::Fatal, "{code}");
        }
    }

    #[test]
    fn test_classify_abnormal() {
        assert_eq!(CloseAction::classify(None), CloseAction::Resume);
        assert_eq!(CloseAction::classify(Some(1006)), CloseAction::Resume);
        assert_eq!(CloseAction::classify(Some(1001)), CloseAction::Resume);
    }

    #[test]
    fn test_close_code_display() {
        let display = CloseCode::AuthenticationFailed.to_string();
        assert!(display.contains("4004"));
        assert!(display.contains("Authentication"));
    }
}
