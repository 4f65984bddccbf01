//! Connection bootstrap
//!
//! Fetches the gateway URL and session start limits before the first socket
//! is opened. The HTTP implementation lives with the REST client.

use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Session start limits from the bootstrap call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    pub reset_after: u64,
    pub max_concurrency: u32,
}

impl Default for SessionStartLimit {
    fn default() -> Self {
        Self {
            total: 1000,
            remaining: 1000,
            reset_after: 0,
            max_concurrency: 1,
        }
    }
}

/// Response of `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    /// WebSocket URL to connect to
    pub url: String,
    /// Recommended shard count
    #[serde(default = "default_shards")]
    pub shards: u32,
    #[serde(default)]
    pub session_start_limit: SessionStartLimit,
}

fn default_shards() -> u32 {
    1
}

impl ConnectionMetadata {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shards: default_shards(),
            session_start_limit: SessionStartLimit::default(),
        }
    }
}

/// Source of connection metadata
///
/// Implementations must map a rejected token to
/// `GatewayError::Authentication`.
#[async_trait]
pub trait GatewayBootstrap: Send + Sync {
    async fn fetch_connection_metadata(&self, token: &str) -> GatewayResult<ConnectionMetadata>;
}

/// Bootstrap with a fixed URL and no network call
#[derive(Debug, Clone)]
pub struct StaticBootstrap {
    metadata: ConnectionMetadata,
}

impl StaticBootstrap {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            metadata: ConnectionMetadata::new(url),
        }
    }
}

#[async_trait]
impl GatewayBootstrap for StaticBootstrap {
    async fn fetch_connection_metadata(&self, _token: &str) -> GatewayResult<ConnectionMetadata> {
        Ok(self.metadata.clone())
    }
}
