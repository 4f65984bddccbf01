//! User entity - a platform account as sent over the wire

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// User object (`READY.user`, `USER_UPDATE`, message authors)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    #[serde(default = "default_discriminator")]
    pub discriminator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub system: bool,
}

fn default_discriminator() -> String {
    "0".to_string()
}

impl User {
    /// Get the full tag: username#discriminator, or just the username for
    /// accounts migrated to unique usernames
    pub fn tag(&self) -> String {
        if self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }

    /// Name shown in clients
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}
