//! Client façade
//!
//! Owns the handler registry, the cache and the REST handle, and drives one
//! gateway connection per login.

use crate::dispatch::{
    DispatchContext, DispatchRouter, EventArgs, HandlerRegistry, ListenerId, ReadySignal,
    RegistrationError, Transformer,
};
use crate::rest::{RestClient, RestError};
use chat_cache::{CacheOptions, SharedCache};
use chat_common::{ClientConfig, ConfigError};
use chat_gateway::{
    ConnectionStatus, DispatchSink, GatewayBootstrap, GatewayConnection, GatewayError, GatewayHandle,
    GatewayOptions, GatewayResult, PresencePayload, SessionState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Client is not logged in")]
    NotLoggedIn,

    #[error("Client is already logged in")]
    AlreadyLoggedIn,

    #[error("Gateway task failed: {0}")]
    Task(String),
}

impl ClientError {
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_authentication())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

struct Running {
    gateway: GatewayHandle,
    router: Arc<DispatchRouter>,
    task: JoinHandle<GatewayResult<()>>,
}

pub struct Client {
    config: ClientConfig,
    rest: RestClient,
    cache: SharedCache,
    bootstrap: Arc<dyn GatewayBootstrap>,
    ready: ReadySignal,
    /// Lock order: `registry` before `running`
    registry: Mutex<HandlerRegistry>,
    running: Mutex<Option<Running>>,
    restore: Mutex<Option<SessionState>>,
}

impl Client {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let rest = RestClient::from_config(&config);
        Self {
            bootstrap: Arc::new(rest.clone()),
            rest,
            config,
            cache: chat_cache::Cache::shared(),
            ready: ReadySignal::new(),
            registry: Mutex::new(HandlerRegistry::new()),
            running: Mutex::new(None),
            restore: Mutex::new(None),
        }
    }

    /// Load the configuration from the environment
    pub fn from_env() -> ClientResult<Self> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    /// Replace the `GET /gateway/bot` bootstrap
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn GatewayBootstrap>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Resume a persisted session on the next login
    #[must_use]
    pub fn with_session(self, state: SessionState) -> Self {
        *self.restore.lock() = Some(state);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Whether the first READY of the current login was seen
    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    // Registration

    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> ClientResult<ListenerId>
    where
        F: Fn(&DispatchContext, &EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.update_handlers(|registry| Ok(registry.on(event, callback)))
    }

    pub fn once<F>(&self, event: impl Into<String>, callback: F) -> ClientResult<ListenerId>
    where
        F: Fn(&DispatchContext, &EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.update_handlers(|registry| Ok(registry.once(event, callback)))
    }

    pub fn off(&self, id: ListenerId) -> ClientResult<bool> {
        self.update_handlers(|registry| Ok(registry.off(id)))
    }

    pub fn transform(&self, event: impl Into<String>, transformer: Transformer) -> ClientResult<()> {
        self.update_handlers(|registry| registry.set_transformer(event, transformer))
    }

    pub fn enable_cache(&self, options: CacheOptions) -> ClientResult<()> {
        self.update_handlers(|registry| registry.append_caching_handlers(options))
    }

    /// Apply a change to the registry. While logged in the routine is
    /// recompiled and swapped in; a failing change leaves the registry as it
    /// was.
    pub fn update_handlers<R, F>(&self, f: F) -> ClientResult<R>
    where
        F: FnOnce(&mut HandlerRegistry) -> Result<R, RegistrationError>,
    {
        let mut registry = self.registry.lock();
        let mut next = registry.clone();
        let out = f(&mut next)?;

        if let Some(running) = self.running.lock().as_ref() {
            running.router.replace(next.compile(self.ready.clone())?);
        }
        *registry = next;
        Ok(out)
    }

    // Lifecycle

    /// Connect and wait for the first READY
    pub async fn login(&self, token: impl Into<String>) -> ClientResult<()> {
        let token = token.into();
        let gateway = {
            let registry = self.registry.lock();
            let mut running = self.running.lock();
            if running.is_some() {
                return Err(ClientError::AlreadyLoggedIn);
            }

            let routine = registry.compile(self.ready.clone())?;
            self.ready.reset();
            self.rest.set_token(token.clone());

            let mut options = GatewayOptions::from_config(&self.config);
            options.token = token;
            let mut connection = GatewayConnection::new(options, Arc::clone(&self.bootstrap));
            if let Some(state) = self.restore.lock().take() {
                connection = connection.with_session(state);
            }

            let gateway = connection.handle();
            let router = Arc::new(DispatchRouter::new(
                routine,
                Arc::clone(&self.cache),
                self.rest.clone(),
                gateway.clone(),
            ));
            let sink: Arc<dyn DispatchSink> = router.clone();
            let task = tokio::spawn(connection.run(sink));

            *running = Some(Running {
                gateway: gateway.clone(),
                router,
                task,
            });
            gateway
        };

        let mut ready = self.ready.subscribe();
        let mut status = gateway.subscribe_status();
        let terminated = tokio::select! {
            biased;
            _ = ready.wait_for(|ready| *ready) => false,
            _ = status.wait_for(|status| *status == ConnectionStatus::Terminated) => true,
        };

        if terminated {
            // The connection ended before READY
            self.finish().await?;
            return Err(GatewayError::ConnectionClosed.into());
        }

        tracing::info!(
            session_id = gateway.session().session_id.as_deref().unwrap_or_default(),
            "Logged in"
        );
        Ok(())
    }

    /// Close the connection with a normal close and wait for it to stop
    pub async fn close(&self) -> ClientResult<()> {
        let gateway = match self.running.lock().as_ref() {
            Some(running) => running.gateway.clone(),
            None => return Err(ClientError::NotLoggedIn),
        };
        gateway.close().await?;
        self.finish().await
    }

    /// Wait until the connection stops on its own
    pub async fn wait(&self) -> ClientResult<()> {
        let mut status = match self.running.lock().as_ref() {
            Some(running) => running.gateway.subscribe_status(),
            None => return Err(ClientError::NotLoggedIn),
        };
        let _ = status
            .wait_for(|status| *status == ConnectionStatus::Terminated)
            .await;
        self.finish().await
    }

    async fn finish(&self) -> ClientResult<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        match running.task.await {
            Ok(result) => result.map_err(ClientError::from),
            Err(e) => Err(ClientError::Task(e.to_string())),
        }
    }

    // Session

    pub fn gateway(&self) -> Option<GatewayHandle> {
        self.running.lock().as_ref().map(|running| running.gateway.clone())
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Option<Arc<SessionState>> {
        self.gateway().map(|gateway| gateway.session())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.gateway()
            .map_or(ConnectionStatus::Idle, |gateway| gateway.status())
    }

    pub async fn ping(&self) -> ClientResult<Duration> {
        let gateway = self.gateway().ok_or(ClientError::NotLoggedIn)?;
        Ok(gateway.ping().await?)
    }

    pub fn set_presence(&self, presence: PresencePayload) -> ClientResult<()> {
        let gateway = self.gateway().ok_or(ClientError::NotLoggedIn)?;
        Ok(gateway.update_presence(presence)?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("registry", &*self.registry.lock())
            .finish_non_exhaustive()
    }
}
