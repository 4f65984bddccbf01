//! # chat-core
//!
//! Shared value objects and wire entities for the chat platform client.
//! This crate has no dependency on networking or the async runtime.

pub mod entities;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Channel, ChannelType, Guild, UnavailableGuild, User, VoiceState};
pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
