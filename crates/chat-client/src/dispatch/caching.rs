//! Cache steps
//!
//! The fixed catalog of cacheable resources and the events that write them.

use super::error::RegistrationError;
use super::transformer::{Transformed, Transformer};
use chat_cache::{snowflake_field, Cache, CacheOptions, CachePosition, CacheResource, CachedValue};
use chat_gateway::GatewayEventType as Event;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Write performed by one cache step
#[derive(Debug, Clone)]
pub(crate) enum CacheWrite {
    UpsertGuild { seed: Option<GuildSeed> },
    RemoveGuild,
    UpsertChannel,
    RemoveChannel,
    UpsertThread,
    RemoveThread,
    /// Upsert, or remove when the user left voice
    VoiceState,
    /// `READY.user`, mapped with the USER_UPDATE transformer when enabled
    SelfUserFromReady { transformer: Option<Transformer> },
    SelfUser,
}

/// Children of a GUILD_CREATE payload to seed into the cache
#[derive(Debug, Clone, Default)]
pub(crate) struct GuildSeed {
    channels: Option<Seed>,
    threads: Option<Seed>,
    voice_states: Option<Seed>,
}

#[derive(Debug, Clone)]
pub(crate) struct Seed {
    transformer: Option<Transformer>,
}

#[derive(Debug, Clone)]
pub(crate) struct CacheStep {
    pub(crate) resource: CacheResource,
    pub(crate) position: CachePosition,
    pub(crate) write: CacheWrite,
    /// Store transformer output instead of the raw payload
    pub(crate) transformed: bool,
}

impl CacheStep {
    pub(crate) fn apply(&self, cache: &Cache, data: &Arc<Value>, transformed: Option<&Transformed>) {
        let value = || {
            if self.transformed {
                transformed
                    .and_then(Transformed::primary)
                    .map(CachedValue::Mapped)
            } else {
                Some(CachedValue::Raw(Arc::clone(data)))
            }
        };

        match &self.write {
            CacheWrite::UpsertGuild { seed } => {
                let Some(id) = self.id(data, "id") else { return };
                if let Some(value) = value() {
                    cache.insert_guild(id, value);
                }
                if let Some(seed) = seed {
                    seed.apply(cache, id, data);
                }
            }
            CacheWrite::RemoveGuild => {
                let Some(id) = self.id(data, "id") else { return };
                // Outages keep the cached guild
                if data.get("unavailable").and_then(Value::as_bool) == Some(true) {
                    tracing::debug!(guild_id = %id, "Guild unavailable, keeping cache entry");
                    return;
                }
                cache.remove_guild(id);
            }
            CacheWrite::UpsertChannel => {
                let Some(id) = self.id(data, "id") else { return };
                if let Some(value) = value() {
                    cache.insert_channel(id, snowflake_field(data, "guild_id"), value);
                }
            }
            CacheWrite::RemoveChannel => {
                if let Some(id) = self.id(data, "id") {
                    cache.remove_channel(id);
                }
            }
            CacheWrite::UpsertThread => {
                let Some(id) = self.id(data, "id") else { return };
                if let Some(value) = value() {
                    cache.insert_thread(id, snowflake_field(data, "guild_id"), value);
                }
            }
            CacheWrite::RemoveThread => {
                if let Some(id) = self.id(data, "id") {
                    cache.remove_thread(id);
                }
            }
            CacheWrite::VoiceState => {
                let (Some(guild_id), Some(user_id)) =
                    (self.id(data, "guild_id"), self.id(data, "user_id"))
                else {
                    return;
                };
                if data.get("channel_id").map_or(true, Value::is_null) {
                    cache.remove_voice_state(guild_id, user_id);
                } else if let Some(value) = value() {
                    cache.insert_voice_state(guild_id, user_id, value);
                }
            }
            CacheWrite::SelfUserFromReady { transformer } => {
                let Some(user) = data.get("user").filter(|user| !user.is_null()) else {
                    return;
                };
                let value = if self.transformed {
                    transformer.as_ref().and_then(|transformer| map_child(transformer, user))
                } else {
                    Some(CachedValue::raw(user.clone()))
                };
                if let Some(value) = value {
                    cache.set_self_user(value);
                }
            }
            CacheWrite::SelfUser => {
                if let Some(value) = value() {
                    cache.set_self_user(value);
                }
            }
        }
    }

    fn id(&self, data: &Value, field: &str) -> Option<chat_core::Snowflake> {
        let id = snowflake_field(data, field);
        if id.is_none() {
            tracing::debug!(resource = %self.resource, field, "Cache step skipped, id missing");
        }
        id
    }
}

impl GuildSeed {
    fn apply(&self, cache: &Cache, guild_id: chat_core::Snowflake, data: &Value) {
        if let Some(seed) = &self.channels {
            for channel in items(data, "channels") {
                if let (Some(id), Some(value)) = (snowflake_field(channel, "id"), seed.value(channel)) {
                    cache.insert_channel(id, Some(guild_id), value);
                }
            }
        }
        if let Some(seed) = &self.threads {
            for thread in items(data, "threads") {
                if let (Some(id), Some(value)) = (snowflake_field(thread, "id"), seed.value(thread)) {
                    cache.insert_thread(id, Some(guild_id), value);
                }
            }
        }
        if let Some(seed) = &self.voice_states {
            for state in items(data, "voice_states") {
                if let (Some(user_id), Some(value)) =
                    (snowflake_field(state, "user_id"), seed.value(state))
                {
                    cache.insert_voice_state(guild_id, user_id, value);
                }
            }
        }
    }
}

impl Seed {
    fn value(&self, item: &Value) -> Option<CachedValue> {
        match &self.transformer {
            None => Some(CachedValue::raw(item.clone())),
            Some(transformer) => map_child(transformer, item),
        }
    }
}

fn map_child(transformer: &Transformer, item: &Value) -> Option<CachedValue> {
    match transformer.apply(item) {
        Ok(transformed) => transformed.primary().map(CachedValue::Mapped),
        Err(e) => {
            tracing::warn!(error = %e, "Transformer failed while seeding cache");
            None
        }
    }
}

fn items<'a>(data: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    data.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Events whose transformer feeds a resource's cache entries
fn upsert_events(resource: CacheResource) -> &'static [Event] {
    match resource {
        CacheResource::Guild => &[Event::GuildCreate, Event::GuildUpdate],
        CacheResource::Channel => &[Event::ChannelCreate, Event::ChannelUpdate],
        CacheResource::Thread => &[Event::ThreadCreate, Event::ThreadUpdate],
        CacheResource::VoiceState => &[Event::VoiceStateUpdate],
        CacheResource::SelfUser => &[Event::UserUpdate],
    }
}

/// Check the relationships between cache rules
pub(crate) fn validate_rules(options: &CacheOptions) -> Result<(), RegistrationError> {
    if options.voice_states.is_some() && options.guilds.is_none() {
        return Err(RegistrationError::VoiceStateWithoutGuild);
    }
    Ok(())
}

/// Build the cache steps of every enabled rule, paired with their event
pub(crate) fn cache_steps(
    options: &CacheOptions,
    transformers: &HashMap<String, Transformer>,
) -> Result<Vec<(&'static str, CacheStep)>, RegistrationError> {
    validate_rules(options)?;

    let seed_for = |resource: CacheResource| {
        options.rule(resource).map(|rule| Seed {
            transformer: if rule.apply_transformers {
                upsert_events(resource)
                    .first()
                    .and_then(|event| transformers.get(event.as_str()))
                    .cloned()
            } else {
                None
            },
        })
    };

    let mut steps = Vec::new();
    for (resource, rule) in options.rules() {
        if rule.apply_transformers {
            for event in upsert_events(resource) {
                if !transformers.contains_key(event.as_str()) {
                    return Err(RegistrationError::MissingTransformer {
                        resource,
                        event: event.as_str(),
                    });
                }
            }
        }

        let writes: Vec<(Event, CacheWrite)> = match resource {
            CacheResource::Guild => vec![
                (
                    Event::GuildCreate,
                    CacheWrite::UpsertGuild {
                        seed: Some(GuildSeed {
                            channels: seed_for(CacheResource::Channel),
                            threads: seed_for(CacheResource::Thread),
                            voice_states: seed_for(CacheResource::VoiceState),
                        }),
                    },
                ),
                (Event::GuildUpdate, CacheWrite::UpsertGuild { seed: None }),
                (Event::GuildDelete, CacheWrite::RemoveGuild),
            ],
            CacheResource::Channel => vec![
                (Event::ChannelCreate, CacheWrite::UpsertChannel),
                (Event::ChannelUpdate, CacheWrite::UpsertChannel),
                (Event::ChannelDelete, CacheWrite::RemoveChannel),
            ],
            CacheResource::Thread => vec![
                (Event::ThreadCreate, CacheWrite::UpsertThread),
                (Event::ThreadUpdate, CacheWrite::UpsertThread),
                (Event::ThreadDelete, CacheWrite::RemoveThread),
            ],
            CacheResource::VoiceState => vec![(Event::VoiceStateUpdate, CacheWrite::VoiceState)],
            CacheResource::SelfUser => vec![
                (
                    Event::Ready,
                    CacheWrite::SelfUserFromReady {
                        transformer: if rule.apply_transformers {
                            transformers.get(Event::UserUpdate.as_str()).cloned()
                        } else {
                            None
                        },
                    },
                ),
                (Event::UserUpdate, CacheWrite::SelfUser),
            ],
        };

        steps.extend(writes.into_iter().map(|(event, write)| {
            (
                event.as_str(),
                CacheStep {
                    resource,
                    position: rule.position,
                    write,
                    transformed: rule.apply_transformers,
                },
            )
        }));
    }
    Ok(steps)
}
