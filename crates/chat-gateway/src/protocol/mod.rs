//! Gateway protocol definitions
//!
//! Op codes, the payload envelope, typed payload bodies and close codes.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseAction, CloseCode, FRESH_RECONNECT, NORMAL_CLOSE};
pub use messages::GatewayPayload;
pub use opcodes::{Direction, OpCode, UnknownOpCode};
pub use payloads::{
    Activity, HelloPayload, IdentifyPayload, IdentifyProperties, PresencePayload, ResumePayload,
    UserStatus,
};
