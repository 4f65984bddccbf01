//! Gateway connection options
//!
//! Mutable at runtime through `GatewayHandle::set_options`; changes apply to
//! the next Identify or Resume.

use crate::protocol::{IdentifyPayload, IdentifyProperties, PresencePayload, ResumePayload};
use chat_common::{ClientConfig, TransportErrorPolicy};
use chat_core::Intents;
use std::fmt;
use std::time::Duration;

/// Options used to identify and drive a gateway connection
#[derive(Clone)]
pub struct GatewayOptions {
    pub token: String,
    pub intents: Intents,
    pub presence: Option<PresencePayload>,
    pub properties: IdentifyProperties,
    pub large_threshold: Option<u16>,
    pub compress: Option<bool>,
    /// `[shard_id, num_shards]`
    pub shard: Option<[u32; 2]>,
    pub api_version: u8,
    pub transport_error_policy: TransportErrorPolicy,
    pub ping_timeout: Duration,
}

impl GatewayOptions {
    pub const DEFAULT_API_VERSION: u8 = 10;

    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: Intents::default(),
            presence: None,
            properties: IdentifyProperties::new(),
            large_threshold: None,
            compress: None,
            shard: None,
            api_version: Self::DEFAULT_API_VERSION,
            transport_error_policy: TransportErrorPolicy::default(),
            ping_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            token: config.token.clone(),
            intents: config.intents,
            large_threshold: config.large_threshold,
            api_version: config.gateway_version,
            transport_error_policy: config.transport_error_policy,
            ping_timeout: config.ping_timeout(),
            ..Self::new(String::new())
        }
    }

    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: PresencePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    #[must_use]
    pub fn with_shard(mut self, shard_id: u32, num_shards: u32) -> Self {
        self.shard = Some([shard_id, num_shards]);
        self
    }

    #[must_use]
    pub fn with_transport_error_policy(mut self, policy: TransportErrorPolicy) -> Self {
        self.transport_error_policy = policy;
        self
    }

    #[must_use]
    pub fn identify_payload(&self) -> IdentifyPayload {
        IdentifyPayload {
            token: self.token.clone(),
            properties: self.properties.clone(),
            compress: self.compress,
            large_threshold: self.large_threshold,
            shard: self.shard,
            presence: self.presence.clone(),
            intents: self.intents,
        }
    }

    #[must_use]
    pub fn resume_payload(&self, session_id: &str, sequence: Option<u64>) -> ResumePayload {
        ResumePayload {
            token: self.token.clone(),
            session_id: session_id.to_string(),
            seq: sequence.unwrap_or(0),
        }
    }

    /// Socket URL with version and encoding query parameters
    #[must_use]
    pub fn socket_url(&self, base: &str) -> String {
        let base = base.split('?').next().unwrap_or(base);
        let has_path = base
            .split_once("://")
            .is_some_and(|(_, rest)| rest.contains('/'));
        let separator = if has_path { "" } else { "/" };
        format!("{base}{separator}?v={}&encoding=json", self.api_version)
    }
}

impl fmt::Debug for GatewayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayOptions")
            .field("token", &"[REDACTED]")
            .field("intents", &self.intents)
            .field("presence", &self.presence)
            .field("large_threshold", &self.large_threshold)
            .field("shard", &self.shard)
            .field("api_version", &self.api_version)
            .field("transport_error_policy", &self.transport_error_policy)
            .finish()
    }
}
