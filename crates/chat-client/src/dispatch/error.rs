//! Registration errors

use chat_cache::CacheResource;
use thiserror::Error;

/// Invalid handler registration, raised before any event is dispatched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// Cache rule stores transformed values but the event has no transformer
    #[error("cache rule for {resource} applies transformers but {event} has no transformer")]
    MissingTransformer {
        resource: CacheResource,
        event: &'static str,
    },

    /// Voice states are keyed by guild and need the guild rule
    #[error("voice state caching requires the guild cache rule")]
    VoiceStateWithoutGuild,

    #[error("a transformer is already registered for {0}")]
    DuplicateTransformer(String),

    #[error("a cache rule for {0} is already registered")]
    DuplicateCacheRule(CacheResource),
}
