//! # chat-client
//!
//! Client for the chat gateway: declare listeners, transformers and cache
//! rules, then log in.
//!
//! ```no_run
//! use chat_client::{Client, CacheOptions};
//! use chat_common::ClientConfig;
//!
//! # async fn run() -> Result<(), chat_client::ClientError> {
//! let client = Client::new(ClientConfig::new("token"));
//! client.enable_cache(CacheOptions::all())?;
//! client.on("MESSAGE_CREATE", |ctx, args| {
//!     tracing::info!(event = %ctx.event, data = ?args.raw(), "message");
//!     Ok(())
//! })?;
//! client.login("token").await?;
//! client.wait().await
//! # }
//! ```

pub mod client;
pub mod dispatch;
pub mod rest;

pub use chat_cache::{Cache, CacheOptions, CachePosition, CacheResource, CacheRule, CachedValue};
pub use client::{Client, ClientError, ClientResult};
pub use dispatch::{
    DispatchContext, DispatchRoutine, DispatchRouter, EventArgs, HandlerRegistry, HandlerTable,
    ListenerId, ReadySignal, RegistrationError, StepKind, Transformed, Transformer,
};
pub use rest::{RestClient, RestError};
