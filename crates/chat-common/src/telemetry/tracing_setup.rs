//! Tracing setup
//!
//! Installs a `tracing` subscriber. `RUST_LOG` wins over the preset filter.

use crate::config::Environment;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Transport crates log every frame at debug; keep them quiet by default
const QUIET_DEPENDENCIES: &str = "tungstenite=warn,tokio_tungstenite=warn,hyper=warn,reqwest=warn";

/// Subscriber options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
    /// Emit JSON lines
    pub json: bool,
    /// Log span open and close
    pub span_events: bool,
    pub file_line: bool,
    pub thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: format!("info,{QUIET_DEPENDENCIES}"),
            json: false,
            span_events: false,
            file_line: true,
            thread_names: false,
        }
    }
}

impl TracingConfig {
    /// Debug output for the client crates, including per-frame gateway traffic
    #[must_use]
    pub fn development() -> Self {
        Self {
            filter: format!(
                "info,chat_gateway=trace,chat_client=debug,chat_cache=debug,{QUIET_DEPENDENCIES}"
            ),
            span_events: true,
            thread_names: true,
            ..Self::default()
        }
    }

    /// JSON lines at info
    #[must_use]
    pub fn production() -> Self {
        Self {
            json: true,
            file_line: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self::development(),
            Environment::Staging => Self::default(),
            Environment::Production => Self::production(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// Install the default subscriber
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Install a subscriber built from `config`.
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| TracingError::InvalidFilter(e.to_string()))?,
    };

    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_thread_names(config.thread_names)
        .with_span_events(spans);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    installed.map_err(|_| TracingError::AlreadyInitialized)
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,

    #[error("Invalid tracing filter: {0}")]
    InvalidFilter(String),
}
