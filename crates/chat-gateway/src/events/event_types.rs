//! Gateway event names
//!
//! Catalog of the dispatch event names this library knows about. Handlers
//! may still be registered for names outside the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known dispatch event types, sent in the `t` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEventType {
    // Connection events
    Ready,
    Resumed,

    // Guild events
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    GuildMemberAdd,
    GuildMemberUpdate,
    GuildMemberRemove,

    // Channel events
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,

    // Thread events
    ThreadCreate,
    ThreadUpdate,
    ThreadDelete,

    // Message events
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    MessageReactionAdd,
    MessageReactionRemove,

    // Presence and voice events
    PresenceUpdate,
    TypingStart,
    VoiceStateUpdate,

    // User events
    UserUpdate,

    InteractionCreate,
}

impl GatewayEventType {
    pub const ALL: [GatewayEventType; 24] = [
        Self::Ready,
        Self::Resumed,
        Self::GuildCreate,
        Self::GuildUpdate,
        Self::GuildDelete,
        Self::GuildMemberAdd,
        Self::GuildMemberUpdate,
        Self::GuildMemberRemove,
        Self::ChannelCreate,
        Self::ChannelUpdate,
        Self::ChannelDelete,
        Self::ThreadCreate,
        Self::ThreadUpdate,
        Self::ThreadDelete,
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::MessageReactionAdd,
        Self::MessageReactionRemove,
        Self::PresenceUpdate,
        Self::TypingStart,
        Self::VoiceStateUpdate,
        Self::UserUpdate,
        Self::InteractionCreate,
    ];

    /// Wire name of the event type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::ThreadCreate => "THREAD_CREATE",
            Self::ThreadUpdate => "THREAD_UPDATE",
            Self::ThreadDelete => "THREAD_DELETE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::MessageReactionAdd => "MESSAGE_REACTION_ADD",
            Self::MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::TypingStart => "TYPING_START",
            Self::VoiceStateUpdate => "VOICE_STATE_UPDATE",
            Self::UserUpdate => "USER_UPDATE",
            Self::InteractionCreate => "INTERACTION_CREATE",
        }
    }

    /// Look up an event type by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatewayEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown event type: {s}"))
    }
}

impl AsRef<str> for GatewayEventType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(GatewayEventType::Ready.as_str(), "READY");
        assert_eq!(GatewayEventType::VoiceStateUpdate.as_str(), "VOICE_STATE_UPDATE");
        assert_eq!(GatewayEventType::ThreadCreate.to_string(), "THREAD_CREATE");
    }

    #[test]
    fn test_from_name_covers_catalog() {
        for event in GatewayEventType::ALL {
            assert_eq!(GatewayEventType::from_name(event.as_str()), Some(event));
        }
        assert_eq!(GatewayEventType::from_name("NOT_AN_EVENT"), None);
    }

    #[test]
    fn test_serde_matches_as_str() {
        for event in GatewayEventType::ALL {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }
}
