//! REST handle
//!
//! A thin authenticated JSON client over `reqwest`. Besides the one-shot
//! calls exposed to listeners, it implements the gateway bootstrap.

use async_trait::async_trait;
use chat_common::ClientConfig;
use chat_gateway::{ConnectionMetadata, GatewayBootstrap, GatewayError, GatewayResult};
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// REST errors
#[derive(Debug, Error)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    /// Whether the server rejected the credentials
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }
}

/// Authenticated REST handle, cheap to clone
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Arc<str>,
    token: Arc<RwLock<String>>,
}

impl RestClient {
    #[must_use]
    pub fn new(base_url: impl AsRef<str>, token: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
            token: Arc::new(RwLock::new(token.into())),
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base(), config.token.clone())
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = token.into();
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode the JSON response
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, RestError> {
        let token = self.token.read().clone();
        self.send(method, path, &token, body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, RestError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), RestError> {
        self.request::<Value>(Method::DELETE, path, None).await.map(|_| ())
    }

    /// `GET /gateway/bot` with an explicit token
    pub async fn get_gateway_bot(&self, token: &str) -> Result<ConnectionMetadata, RestError> {
        self.send(Method::GET, "/gateway/bot", token, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<T, RestError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(%method, %url, "REST request");

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {token}"));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(RestError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        // Empty bodies decode as null
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl GatewayBootstrap for RestClient {
    async fn fetch_connection_metadata(&self, token: &str) -> GatewayResult<ConnectionMetadata> {
        self.get_gateway_bot(token).await.map_err(|e| match e {
            RestError::Status { status, body } => {
                GatewayError::Authentication(format!("bootstrap returned {status}: {body}"))
            }
            other => GatewayError::Bootstrap(other.to_string()),
        })
    }
}
