//! Gateway payload envelope
//!
//! Every frame on the socket is a JSON object `{op, d, s, t}`.

use super::{HelloPayload, IdentifyPayload, OpCode, PresencePayload, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway payload envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: OpCode,

    /// Event data, `null` when the op code carries none
    #[serde(default)]
    pub d: Value,

    /// Sequence number, only present on Dispatch
    #[serde(default)]
    pub s: Option<u64>,

    /// Event name, only present on Dispatch
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayPayload {
    fn control(op: OpCode, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    // === Client Payloads ===

    /// Heartbeat (op 1) carrying the last received sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::control(OpCode::Heartbeat, last_sequence.map_or(Value::Null, Value::from))
    }

    /// Identify (op 2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(OpCode::Identify, serde_json::to_value(payload)?))
    }

    /// Presence Update (op 3)
    pub fn presence_update(payload: &PresencePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(
            OpCode::PresenceUpdate,
            serde_json::to_value(payload)?,
        ))
    }

    /// Resume (op 6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::control(OpCode::Resume, serde_json::to_value(payload)?))
    }

    // === Server Payloads ===

    /// Dispatch (op 0)
    #[must_use]
    pub fn dispatch(event: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: data,
            s: Some(sequence),
            t: Some(event.into()),
        }
    }

    /// Hello (op 10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::control(
            OpCode::Hello,
            serde_json::json!({ "heartbeat_interval": heartbeat_interval }),
        )
    }

    /// Heartbeat ACK (op 11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::control(OpCode::HeartbeatAck, Value::Null)
    }

    /// Reconnect (op 7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::control(OpCode::Reconnect, Value::Null)
    }

    /// Invalid Session (op 9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::control(OpCode::InvalidSession, Value::Bool(resumable))
    }

    // === Parsing ===

    /// Parse the Hello body (op 10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        HelloPayload::deserialize(&self.d).ok()
    }

    /// Parse the resumable flag of Invalid Session (op 9). Anything but `true`
    /// is treated as not resumable.
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_bool().unwrap_or(false))
    }

    /// Parse the Identify body (op 2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        if self.op != OpCode::Identify {
            return None;
        }
        IdentifyPayload::deserialize(&self.d).ok()
    }

    /// Parse the Resume body (op 6)
    pub fn as_resume(&self) -> Option<ResumePayload> {
        if self.op != OpCode::Resume {
            return None;
        }
        ResumePayload::deserialize(&self.d).ok()
    }

    // === Utilities ===

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayPayload(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayPayload(op={})", self.op)
        }
    }
}
