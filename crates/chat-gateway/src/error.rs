//! Gateway error types

use crate::protocol::CloseCode;
use thiserror::Error;

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Token rejected by the bootstrap call or by close code 4004
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Socket-level error
    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server closed with a code that makes retrying pointless
    #[error("Gateway closed with fatal code {code}: {reason}")]
    FatalClose { code: u16, reason: String },

    /// Connection metadata could not be fetched
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection task is gone
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl GatewayError {
    /// Build the error for a fatal close code
    #[must_use]
    pub fn from_close(code: u16, reason: &str) -> Self {
        match CloseCode::from_u16(code) {
            Some(CloseCode::AuthenticationFailed) => Self::Authentication(if reason.is_empty() {
                CloseCode::AuthenticationFailed.description().to_string()
            } else {
                reason.to_string()
            }),
            Some(known) if reason.is_empty() => Self::FatalClose {
                code,
                reason: known.description().to_string(),
            },
            _ => Self::FatalClose {
                code,
                reason: reason.to_string(),
            },
        }
    }

    /// Check if this error means the token is bad
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
