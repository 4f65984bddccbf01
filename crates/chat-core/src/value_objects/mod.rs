//! Value objects - immutable types shared by every layer

mod intents;
mod snowflake;

pub use intents::Intents;
pub use snowflake::{Snowflake, SnowflakeParseError};
