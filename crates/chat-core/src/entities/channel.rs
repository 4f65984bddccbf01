//! Channel entity - text channels, DMs, categories, voice channels and threads

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Channel type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelType {
    /// Guild text channel
    #[default]
    GuildText,
    /// Direct message between users
    Dm,
    /// Guild voice channel
    GuildVoice,
    /// Group direct message
    GroupDm,
    /// Guild category for organizing channels
    GuildCategory,
    /// Announcement channel
    GuildAnnouncement,
    /// Thread inside an announcement channel
    AnnouncementThread,
    /// Public thread
    PublicThread,
    /// Private thread
    PrivateThread,
    /// Stage voice channel
    GuildStageVoice,
    /// Forum channel
    GuildForum,
    /// Any type this library does not know about
    Unknown(u8),
}

impl ChannelType {
    /// Check if this channel type is a thread
    #[inline]
    #[must_use]
    pub fn is_thread(self) -> bool {
        matches!(
            self,
            Self::AnnouncementThread | Self::PublicThread | Self::PrivateThread
        )
    }
}

impl From<u8> for ChannelType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildAnnouncement,
            10 => Self::AnnouncementThread,
            11 => Self::PublicThread,
            12 => Self::PrivateThread,
            13 => Self::GuildStageVoice,
            15 => Self::GuildForum,
            other => Self::Unknown(other),
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(ct: ChannelType) -> Self {
        match ct {
            ChannelType::GuildText => 0,
            ChannelType::Dm => 1,
            ChannelType::GuildVoice => 2,
            ChannelType::GroupDm => 3,
            ChannelType::GuildCategory => 4,
            ChannelType::GuildAnnouncement => 5,
            ChannelType::AnnouncementThread => 10,
            ChannelType::PublicThread => 11,
            ChannelType::PrivateThread => 12,
            ChannelType::GuildStageVoice => 13,
            ChannelType::GuildForum => 15,
            ChannelType::Unknown(other) => other,
        }
    }
}

/// Channel object (`CHANNEL_*` and `THREAD_*` events)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Snowflake>,
}

impl Channel {
    /// Check if this channel is a thread
    #[inline]
    #[must_use]
    pub fn is_thread(&self) -> bool {
        self.kind.is_thread()
    }
}
