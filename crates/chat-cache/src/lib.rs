//! # chat-cache
//!
//! In-memory entity cache fed by gateway dispatch events.
//!
//! ## Features
//!
//! - **Store**: Concurrent maps for guilds, channels, threads and voice states
//! - **Rules**: Per-resource cache rules controlling position and whether
//!   transformer output is stored instead of the raw payload
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::{Cache, CacheOptions, CacheResource, CacheRule};
//!
//! let options = CacheOptions::none()
//!     .with(CacheResource::Guild, CacheRule::first())
//!     .with(CacheResource::Channel, CacheRule::last().transformed());
//!
//! let cache = Cache::shared();
//! if let Some(guild) = cache.guild(guild_id) {
//!     println!("{:?}", guild.as_raw());
//! }
//! ```

pub mod options;
pub mod store;
pub mod value;

pub use options::{CacheOptions, CachePosition, CacheResource, CacheRule};
pub use store::{snowflake_field, Cache, SharedCache};
pub use value::CachedValue;
