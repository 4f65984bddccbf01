//! Guild entity - a community server as sent in `GUILD_CREATE` / `GUILD_UPDATE`

use serde::{Deserialize, Serialize};

use super::{Channel, VoiceState};
use crate::value_objects::Snowflake;

/// Guild object
///
/// Only the fields the client library reads are typed; the rest of the
/// payload stays available through the raw event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub threads: Vec<Channel>,
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
}

/// Guild stub delivered in `READY` and `GUILD_DELETE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guild_create_payload() {
        let guild: Guild = serde_json::from_value(json!({
            "id": "197038439483310086",
            "name": "Test Guild",
            "owner_id": "80351110224678912",
            "member_count": 2,
            "channels": [{"id": "1", "type": 0, "name": "general"}],
            "voice_states": [{"user_id": "5", "channel_id": "2", "session_id": "abc"}]
        }))
        .unwrap();

        assert_eq!(guild.name, "Test Guild");
        assert_eq!(guild.channels.len(), 1);
        assert_eq!(guild.voice_states.len(), 1);
        assert!(guild.threads.is_empty());
        assert!(!guild.unavailable);
    }

    #[test]
    fn test_unavailable_guild() {
        let stub: UnavailableGuild =
            serde_json::from_value(json!({"id": "1", "unavailable": true})).unwrap();
        assert!(stub.unavailable);
    }
}
