//! In-memory entity store
//!
//! Concurrent maps keyed by snowflake. Dispatch steps write here; user
//! callbacks read through `DispatchContext::cache`.

use crate::value::CachedValue;
use chat_core::Snowflake;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Shared cache handle
pub type SharedCache = Arc<Cache>;

/// Entity cache for guilds, channels, threads, voice states and the
/// connected user
#[derive(Debug, Default)]
pub struct Cache {
    guilds: DashMap<Snowflake, CachedValue>,
    channels: DashMap<Snowflake, GuildScoped>,
    threads: DashMap<Snowflake, GuildScoped>,
    /// Keyed by (guild id, user id)
    voice_states: DashMap<(Snowflake, Snowflake), CachedValue>,
    self_user: RwLock<Option<CachedValue>>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> SharedCache {
        Arc::new(Self::new())
    }

    // ==================== Guilds ====================

    #[must_use]
    pub fn guild(&self, id: Snowflake) -> Option<CachedValue> {
        self.guilds.get(&id).map(|entry| entry.value().clone())
    }

    pub fn insert_guild(&self, id: Snowflake, value: CachedValue) -> Option<CachedValue> {
        self.guilds.insert(id, value)
    }

    /// Remove a guild together with its channels, threads and voice states
    pub fn remove_guild(&self, id: Snowflake) -> Option<CachedValue> {
        self.channels.retain(|_, entry| entry.guild_id != Some(id));
        self.threads.retain(|_, entry| entry.guild_id != Some(id));
        self.voice_states.retain(|(guild_id, _), _| *guild_id != id);
        let removed = self.guilds.remove(&id).map(|(_, value)| value);
        if removed.is_some() {
            tracing::trace!(guild_id = %id, "Evicted guild from cache");
        }
        removed
    }

    #[must_use]
    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    #[must_use]
    pub fn guild_ids(&self) -> Vec<Snowflake> {
        self.guilds.iter().map(|entry| *entry.key()).collect()
    }

    // ==================== Channels ====================

    #[must_use]
    pub fn channel(&self, id: Snowflake) -> Option<CachedValue> {
        self.channels.get(&id).map(|entry| entry.value.clone())
    }

    /// Insert a channel, remembering its guild for eviction
    pub fn insert_channel(
        &self,
        id: Snowflake,
        guild_id: Option<Snowflake>,
        value: CachedValue,
    ) -> Option<CachedValue> {
        self.channels
            .insert(id, GuildScoped { guild_id, value })
            .map(|previous| previous.value)
    }

    pub fn remove_channel(&self, id: Snowflake) -> Option<CachedValue> {
        self.channels.remove(&id).map(|(_, entry)| entry.value)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // ==================== Threads ====================

    #[must_use]
    pub fn thread(&self, id: Snowflake) -> Option<CachedValue> {
        self.threads.get(&id).map(|entry| entry.value.clone())
    }

    pub fn insert_thread(
        &self,
        id: Snowflake,
        guild_id: Option<Snowflake>,
        value: CachedValue,
    ) -> Option<CachedValue> {
        self.threads
            .insert(id, GuildScoped { guild_id, value })
            .map(|previous| previous.value)
    }

    pub fn remove_thread(&self, id: Snowflake) -> Option<CachedValue> {
        self.threads.remove(&id).map(|(_, entry)| entry.value)
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    // ==================== Voice states ====================

    #[must_use]
    pub fn voice_state(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<CachedValue> {
        self.voice_states
            .get(&(guild_id, user_id))
            .map(|entry| entry.value().clone())
    }

    pub fn insert_voice_state(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
        value: CachedValue,
    ) -> Option<CachedValue> {
        self.voice_states.insert((guild_id, user_id), value)
    }

    pub fn remove_voice_state(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> Option<CachedValue> {
        self.voice_states
            .remove(&(guild_id, user_id))
            .map(|(_, value)| value)
    }

    /// Voice states of one guild
    #[must_use]
    pub fn guild_voice_states(&self, guild_id: Snowflake) -> Vec<(Snowflake, CachedValue)> {
        self.voice_states
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn voice_state_count(&self) -> usize {
        self.voice_states.len()
    }

    // ==================== Self user ====================

    #[must_use]
    pub fn self_user(&self) -> Option<CachedValue> {
        self.self_user.read().clone()
    }

    pub fn set_self_user(&self, value: CachedValue) -> Option<CachedValue> {
        self.self_user.write().replace(value)
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.guilds.clear();
        self.channels.clear();
        self.threads.clear();
        self.voice_states.clear();
        *self.self_user.write() = None;
    }
}

#[derive(Debug)]
struct GuildScoped {
    guild_id: Option<Snowflake>,
    value: CachedValue,
}

/// Read a snowflake field from raw event data
#[must_use]
pub fn snowflake_field(data: &Value, field: &str) -> Option<Snowflake> {
    data.get(field).and_then(Snowflake::from_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(value: u64) -> Snowflake {
        Snowflake::new(value)
    }

    #[test]
    fn test_guild_insert_and_get() {
        let cache = Cache::new();
        assert!(cache.guild(id(1)).is_none());

        cache.insert_guild(id(1), CachedValue::raw(json!({"id": "1", "name": "rust"})));
        let guild = cache.guild(id(1)).unwrap();
        assert_eq!(guild.as_raw().unwrap()["name"], "rust");
        assert_eq!(cache.guild_count(), 1);
    }

    #[test]
    fn test_insert_replaces_previous() {
        let cache = Cache::new();
        cache.insert_channel(id(5), None, CachedValue::raw(json!({"name": "old"})));
        let previous = cache.insert_channel(id(5), None, CachedValue::raw(json!({"name": "new"})));

        assert_eq!(previous.unwrap().as_raw().unwrap()["name"], "old");
        assert_eq!(cache.channel(id(5)).unwrap().as_raw().unwrap()["name"], "new");
    }

    #[test]
    fn test_remove_guild_evicts_children() {
        let cache = Cache::new();
        cache.insert_guild(id(1), CachedValue::raw(json!({"id": "1"})));
        cache.insert_channel(id(10), Some(id(1)), CachedValue::raw(json!({"id": "10"})));
        cache.insert_channel(id(11), Some(id(2)), CachedValue::raw(json!({"id": "11"})));
        cache.insert_thread(id(20), Some(id(1)), CachedValue::raw(json!({"id": "20"})));
        cache.insert_voice_state(id(1), id(100), CachedValue::raw(json!({})));
        cache.insert_voice_state(id(2), id(100), CachedValue::raw(json!({})));

        assert!(cache.remove_guild(id(1)).is_some());
        assert!(cache.channel(id(10)).is_none());
        assert!(cache.channel(id(11)).is_some());
        assert!(cache.thread(id(20)).is_none());
        assert!(cache.voice_state(id(1), id(100)).is_none());
        assert!(cache.voice_state(id(2), id(100)).is_some());
    }

    #[test]
    fn test_guild_voice_states() {
        let cache = Cache::new();
        cache.insert_voice_state(id(1), id(100), CachedValue::raw(json!({})));
        cache.insert_voice_state(id(1), id(101), CachedValue::raw(json!({})));
        cache.insert_voice_state(id(2), id(100), CachedValue::raw(json!({})));

        assert_eq!(cache.guild_voice_states(id(1)).len(), 2);
        assert_eq!(cache.voice_state_count(), 3);
        assert!(cache.remove_voice_state(id(1), id(100)).is_some());
        assert_eq!(cache.guild_voice_states(id(1)).len(), 1);
    }

    #[test]
    fn test_self_user_and_clear() {
        let cache = Cache::new();
        assert!(cache.set_self_user(CachedValue::raw(json!({"id": "7"}))).is_none());
        assert!(cache.self_user().is_some());

        cache.insert_guild(id(1), CachedValue::raw(json!({})));
        cache.clear();
        assert!(cache.self_user().is_none());
        assert_eq!(cache.guild_count(), 0);
    }

    #[test]
    fn test_snowflake_field() {
        let data = json!({"guild_id": "42", "user_id": 7});
        assert_eq!(snowflake_field(&data, "guild_id"), Some(id(42)));
        assert_eq!(snowflake_field(&data, "user_id"), Some(id(7)));
        assert_eq!(snowflake_field(&data, "missing"), None);
    }
}
