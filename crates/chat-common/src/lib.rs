//! # chat-common
//!
//! Shared utilities for the client crates: configuration and telemetry.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{ClientConfig, ConfigError, Environment, TransportErrorPolicy};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
