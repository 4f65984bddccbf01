//! Client configuration
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use chat_core::Intents;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

/// Main client configuration
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Bot token used for the bootstrap call and the Identify payload
    pub token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_gateway_version")]
    pub gateway_version: u8,
    #[serde(default)]
    pub intents: Intents,
    #[serde(default)]
    pub large_threshold: Option<u16>,
    #[serde(default)]
    pub transport_error_policy: TransportErrorPolicy,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// What the gateway run loop does when the socket fails mid-session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportErrorPolicy {
    /// Treat the error like an abnormal close and resume the session
    #[default]
    Reconnect,
    /// Stop the run loop and return the error to the caller
    Propagate,
}

impl TransportErrorPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reconnect" => Some(Self::Reconnect),
            "propagate" => Some(Self::Propagate),
            _ => None,
        }
    }
}

// Default value functions
fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_gateway_version() -> u8 {
    10
}

fn default_ping_timeout_ms() -> u64 {
    10_000
}

/// Bounds the gateway accepts for `large_threshold`
const LARGE_THRESHOLD_RANGE: std::ops::RangeInclusive<u16> = 50..=250;

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base_url: default_api_base_url(),
            gateway_version: default_gateway_version(),
            intents: Intents::default(),
            large_threshold: None,
            transport_error_policy: TransportErrorPolicy::default(),
            ping_timeout_ms: default_ping_timeout_ms(),
            env: Environment::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `CHAT_BOT_TOKEN` is missing or a value fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("CHAT_BOT_TOKEN").map_err(|_| ConfigError::MissingVar("CHAT_BOT_TOKEN"))?;

        let intents = match env::var("CHAT_INTENTS") {
            Ok(raw) => Intents::parse(&raw)
                .map_err(|e| ConfigError::InvalidValue("CHAT_INTENTS", e.to_string()))?,
            Err(_) => Intents::default(),
        };

        let large_threshold = match env::var("CHAT_LARGE_THRESHOLD") {
            Ok(raw) => Some(parse_large_threshold(&raw)?),
            Err(_) => None,
        };

        let transport_error_policy = match env::var("CHAT_TRANSPORT_ERROR_POLICY") {
            Ok(raw) => TransportErrorPolicy::parse(&raw)
                .ok_or(ConfigError::InvalidValue("CHAT_TRANSPORT_ERROR_POLICY", raw))?,
            Err(_) => TransportErrorPolicy::default(),
        };

        Ok(Self {
            token,
            api_base_url: env::var("CHAT_API_BASE_URL").unwrap_or_else(|_| default_api_base_url()),
            gateway_version: env::var("CHAT_GATEWAY_VERSION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_gateway_version),
            intents,
            large_threshold,
            transport_error_policy,
            ping_timeout_ms: env::var("CHAT_PING_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_ping_timeout_ms),
            env: env::var("APP_ENV")
                .ok()
                .and_then(|s| Environment::parse(&s))
                .unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_transport_error_policy(mut self, policy: TransportErrorPolicy) -> Self {
        self.transport_error_policy = policy;
        self
    }

    /// # Errors
    /// Returns an error if the threshold is outside 50..=250
    pub fn with_large_threshold(mut self, threshold: u16) -> Result<Self, ConfigError> {
        self.large_threshold = Some(check_large_threshold(threshold)?);
        Ok(self)
    }

    /// API base URL without a trailing slash
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

fn parse_large_threshold(raw: &str) -> Result<u16, ConfigError> {
    let value = raw
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidValue("CHAT_LARGE_THRESHOLD", e.to_string()))?;
    check_large_threshold(value)
}

fn check_large_threshold(value: u16) -> Result<u16, ConfigError> {
    if LARGE_THRESHOLD_RANGE.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue(
            "CHAT_LARGE_THRESHOLD",
            format!("{value} is outside 50..=250"),
        ))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("gateway_version", &self.gateway_version)
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("transport_error_policy", &self.transport_error_policy)
            .field("ping_timeout_ms", &self.ping_timeout_ms)
            .field("env", &self.env)
            .finish()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_is_production() {
        assert!(!Environment::Development.is_production());
        assert!(!Environment::Staging.is_production());
        assert!(Environment::Production.is_production());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("PRODUCTION"), Some(Environment::Production));
        assert_eq!(Environment::parse("staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("qa"), None);
    }

    #[test]
    fn test_transport_policy_parse() {
        assert_eq!(TransportErrorPolicy::parse("Propagate"), Some(TransportErrorPolicy::Propagate));
        assert_eq!(TransportErrorPolicy::parse("reconnect"), Some(TransportErrorPolicy::Reconnect));
        assert_eq!(TransportErrorPolicy::parse("retry"), None);
        assert_eq!(TransportErrorPolicy::default(), TransportErrorPolicy::Reconnect);
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = ClientConfig::new("abc");
        assert_eq!(config.token, "abc");
        assert_eq!(config.api_base_url, "https://discord.com/api/v10");
        assert_eq!(config.gateway_version, 10);
        assert_eq!(config.intents, Intents::NON_PRIVILEGED);
        assert_eq!(config.ping_timeout(), Duration::from_secs(10));
        assert!(config.large_threshold.is_none());
    }

    #[test]
    fn test_api_base_trims_slash() {
        let config = ClientConfig::new("abc").with_api_base_url("http://localhost:8080/api/");
        assert_eq!(config.api_base(), "http://localhost:8080/api");
    }

    #[test]
    fn test_large_threshold_bounds() {
        assert!(ClientConfig::new("abc").with_large_threshold(50).is_ok());
        assert!(ClientConfig::new("abc").with_large_threshold(250).is_ok());
        assert!(ClientConfig::new("abc").with_large_threshold(49).is_err());
        assert!(parse_large_threshold("300").is_err());
        assert!(parse_large_threshold("lots").is_err());
        assert_eq!(parse_large_threshold(" 100 ").unwrap(), 100);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig::new("super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }
}
