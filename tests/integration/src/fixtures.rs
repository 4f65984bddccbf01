//! Gateway payload fixtures

use serde_json::{json, Value};

pub const BOT_USER_ID: &str = "1000";
pub const GUILD_ID: &str = "2000";
pub const CHANNEL_ID: &str = "3000";

pub fn bot_user() -> Value {
    json!({
        "id": BOT_USER_ID,
        "username": "test-bot",
        "discriminator": "0",
        "bot": true
    })
}

/// READY with one unavailable guild
pub fn ready(session_id: &str, resume_url: &str) -> Value {
    json!({
        "v": 10,
        "user": bot_user(),
        "guilds": [{ "id": GUILD_ID, "unavailable": true }],
        "session_id": session_id,
        "resume_gateway_url": resume_url
    })
}

/// GUILD_CREATE with one text channel and one member in voice
pub fn guild_create() -> Value {
    json!({
        "id": GUILD_ID,
        "name": "Test Guild",
        "owner_id": BOT_USER_ID,
        "channels": [
            { "id": CHANNEL_ID, "type": 0, "name": "general", "position": 0 }
        ],
        "threads": [],
        "voice_states": [
            { "user_id": BOT_USER_ID, "channel_id": "3001", "session_id": "voice" }
        ]
    })
}

pub fn message_create(content: &str) -> Value {
    json!({
        "id": "4000",
        "channel_id": CHANNEL_ID,
        "guild_id": GUILD_ID,
        "author": bot_user(),
        "content": content
    })
}
