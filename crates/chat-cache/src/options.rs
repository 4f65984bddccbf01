//! Cache rules
//!
//! Describes which resources are cached and where the cache write runs
//! relative to user callbacks.

use std::fmt;

/// Resources the client knows how to cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheResource {
    Guild,
    Channel,
    Thread,
    VoiceState,
    SelfUser,
}

impl CacheResource {
    /// All cacheable resources, in the order their rules are appended
    pub const ALL: [CacheResource; 5] = [
        Self::Guild,
        Self::Channel,
        Self::Thread,
        Self::VoiceState,
        Self::SelfUser,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Thread => "thread",
            Self::VoiceState => "voice_state",
            Self::SelfUser => "self_user",
        }
    }
}

impl fmt::Display for CacheResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a cache write runs relative to the user callbacks of the same event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePosition {
    /// Before user callbacks, so callbacks observe the updated cache
    #[default]
    First,
    /// After user callbacks, so callbacks observe the previous cache entry
    Last,
}

/// Rule for one cached resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheRule {
    pub position: CachePosition,
    /// Store the event's transformer output instead of the raw payload
    pub apply_transformers: bool,
}

impl CacheRule {
    #[must_use]
    pub fn first() -> Self {
        Self {
            position: CachePosition::First,
            apply_transformers: false,
        }
    }

    #[must_use]
    pub fn last() -> Self {
        Self {
            position: CachePosition::Last,
            apply_transformers: false,
        }
    }

    #[must_use]
    pub fn transformed(mut self) -> Self {
        self.apply_transformers = true;
        self
    }
}

/// Cache configuration: one optional rule per resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheOptions {
    pub guilds: Option<CacheRule>,
    pub channels: Option<CacheRule>,
    pub threads: Option<CacheRule>,
    pub voice_states: Option<CacheRule>,
    pub self_user: Option<CacheRule>,
}

impl CacheOptions {
    /// No caching
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Cache every resource with raw payloads, written before callbacks
    #[must_use]
    pub fn all() -> Self {
        let rule = Some(CacheRule::first());
        Self {
            guilds: rule,
            channels: rule,
            threads: rule,
            voice_states: rule,
            self_user: rule,
        }
    }

    #[must_use]
    pub fn with(mut self, resource: CacheResource, rule: CacheRule) -> Self {
        *self.slot(resource) = Some(rule);
        self
    }

    #[must_use]
    pub fn without(mut self, resource: CacheResource) -> Self {
        *self.slot(resource) = None;
        self
    }

    /// Rule configured for a resource
    #[must_use]
    pub fn rule(&self, resource: CacheResource) -> Option<CacheRule> {
        match resource {
            CacheResource::Guild => self.guilds,
            CacheResource::Channel => self.channels,
            CacheResource::Thread => self.threads,
            CacheResource::VoiceState => self.voice_states,
            CacheResource::SelfUser => self.self_user,
        }
    }

    /// Enabled rules in append order
    pub fn rules(&self) -> impl Iterator<Item = (CacheResource, CacheRule)> + '_ {
        CacheResource::ALL
            .into_iter()
            .filter_map(|resource| self.rule(resource).map(|rule| (resource, rule)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules().next().is_none()
    }

    fn slot(&mut self, resource: CacheResource) -> &mut Option<CacheRule> {
        match resource {
            CacheResource::Guild => &mut self.guilds,
            CacheResource::Channel => &mut self.channels,
            CacheResource::Thread => &mut self.threads,
            CacheResource::VoiceState => &mut self.voice_states,
            CacheResource::SelfUser => &mut self.self_user,
        }
    }
}
