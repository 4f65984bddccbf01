//! Connection event payloads
//!
//! Only the events the connection itself inspects are typed here; everything
//! else is forwarded as raw JSON.

use chat_core::{UnavailableGuild, User};
use serde::{Deserialize, Serialize};

/// READY event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Gateway protocol version
    #[serde(default)]
    pub v: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Guilds the user is in, initially unavailable
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,

    /// Session ID for resuming
    pub session_id: String,

    /// Gateway URL to use when resuming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_gateway_url: Option<String>,

    /// `[shard_id, num_shards]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

/// The READY fields needed to resume later. Parsed separately so a READY
/// whose `user` or `guilds` don't fit [`ReadyEvent`] still records them.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadySession {
    pub session_id: String,

    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}
