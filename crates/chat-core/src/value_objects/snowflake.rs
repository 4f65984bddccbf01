//! Snowflake ids
//!
//! The top 42 bits hold milliseconds since the platform epoch; the rest are
//! worker, process and increment bits the client never inspects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 64-bit platform id. Strings on the wire, numbers accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "WireId", into = "String")]
pub struct Snowflake(u64);

impl Snowflake {
    /// 2015-01-01T00:00:00Z in Unix milliseconds
    pub const EPOCH: u64 = 1_420_070_400_000;

    const TIMESTAMP_SHIFT: u32 = 22;

    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Creation time in Unix milliseconds
    #[inline]
    pub const fn timestamp(self) -> u64 {
        (self.0 >> Self::TIMESTAMP_SHIFT) + Self::EPOCH
    }

    pub fn created_at(self) -> chrono::DateTime<chrono::Utc> {
        i64::try_from(self.timestamp())
            .ok()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_default()
    }

    /// Id held in a JSON value, as a string or a number
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().map(Self),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnowflakeParseError {
    #[error("invalid snowflake format")]
    InvalidFormat,
}

impl FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse()
            .map(Self)
            .map_err(|_| SnowflakeParseError::InvalidFormat)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl From<Snowflake> for String {
    fn from(id: Snowflake) -> Self {
        id.0.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl TryFrom<WireId> for Snowflake {
    type Error = SnowflakeParseError;

    fn try_from(id: WireId) -> Result<Self, Self::Error> {
        match id {
            WireId::Number(n) => Ok(Self(n)),
            WireId::Text(s) => s.parse(),
        }
    }
}
