//! Voice state entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Voice state object (`VOICE_STATE_UPDATE`, `GUILD_CREATE.voice_states`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// `None` when the user left voice
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
}

impl VoiceState {
    /// Whether the user is connected to a voice channel
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.channel_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_voice_state_disconnect() {
        let state: VoiceState = serde_json::from_value(json!({
            "guild_id": "1",
            "channel_id": null,
            "user_id": "2",
            "session_id": "s"
        }))
        .unwrap();

        assert!(!state.is_connected());
        assert_eq!(state.user_id, Snowflake::new(2));
    }
}
