//! Test helpers for integration tests
//!
//! A mock gateway: an axum server answering the bootstrap call and accepting
//! WebSocket connections, each handed to the test as a [`MockConnection`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chat_client::Client;
use chat_common::ClientConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Token the mock bootstrap accepts
pub const TOKEN: &str = "valid-token";

/// How long a test waits for the client before failing
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat interval sent in Hello, long enough to stay out of the way
pub const HEARTBEAT_INTERVAL: u64 = 45_000;

#[derive(Clone)]
struct MockState {
    addr: SocketAddr,
    connections: mpsc::UnboundedSender<MockConnection>,
    bootstrap_calls: Arc<AtomicUsize>,
}

/// Mock gateway server
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    bootstrap_calls: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();
        let bootstrap_calls = Arc::new(AtomicUsize::new(0));

        let state = MockState {
            addr,
            connections: tx,
            bootstrap_calls: Arc::clone(&bootstrap_calls),
        };
        let app = Router::new()
            .route("/api/gateway/bot", get(gateway_bot))
            .route("/ws", get(upgrade))
            .route("/resume", get(upgrade))
            .with_state(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            connections,
            bootstrap_calls,
            _handle: handle,
        })
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn gateway_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn resume_url(&self) -> String {
        format!("ws://{}/resume", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(TOKEN).with_api_base_url(self.api_base_url())
    }

    /// Client bootstrapping against this server
    pub fn client(&self) -> Client {
        Client::new(self.config())
    }

    pub fn bootstrap_calls(&self) -> usize {
        self.bootstrap_calls.load(Ordering::SeqCst)
    }

    /// Next WebSocket connection opened by the client
    pub async fn accept(&mut self) -> Result<MockConnection> {
        tokio::time::timeout(TEST_TIMEOUT, self.connections.recv())
            .await
            .context("no connection within timeout")?
            .context("mock server stopped")
    }

    /// Assert that no connection is opened within `wait`
    pub async fn expect_no_connection(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.connections.recv()).await {
            Ok(Some(connection)) => bail!("unexpected connection to {}", connection.path),
            _ => Ok(()),
        }
    }

    /// Accept a connection and run Hello, Identify and READY on it
    pub async fn handshake(&mut self, session_id: &str) -> Result<MockConnection> {
        let mut connection = self.accept().await?;
        connection.hello(HEARTBEAT_INTERVAL).await?;
        connection.expect_op(2).await?;
        let ready = crate::fixtures::ready(session_id, &self.resume_url());
        connection.dispatch("READY", 1, ready).await?;
        Ok(connection)
    }
}

async fn gateway_bot(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.bootstrap_calls.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bot {TOKEN}"));
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "401: Unauthorized", "code": 0 })),
        )
            .into_response();
    }

    Json(json!({
        "url": format!("ws://{}/ws", state.addr),
        "shards": 1,
        "session_start_limit": {
            "total": 1000,
            "remaining": 999,
            "reset_after": 14_400_000,
            "max_concurrency": 1
        }
    }))
    .into_response()
}

async fn upgrade(State(state): State<MockState>, uri: Uri, ws: WebSocketUpgrade) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);
    ws.on_upgrade(move |socket| async move {
        let _ = state.connections.send(MockConnection {
            socket,
            path,
            query,
        });
    })
}

/// Server side of one client socket
pub struct MockConnection {
    socket: WebSocket,
    pub path: String,
    pub query: Option<String>,
}

impl MockConnection {
    pub async fn send(&mut self, payload: Value) -> Result<()> {
        self.socket.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }

    pub async fn hello(&mut self, interval: u64) -> Result<()> {
        self.send(json!({ "op": 10, "d": { "heartbeat_interval": interval }, "s": null, "t": null }))
            .await
    }

    pub async fn dispatch(&mut self, event: &str, seq: u64, data: Value) -> Result<()> {
        self.send(json!({ "op": 0, "d": data, "s": seq, "t": event })).await
    }

    /// Send a close frame and drop the socket
    pub async fn close(mut self, code: u16) -> Result<()> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "".into(),
            })))
            .await?;
        Ok(())
    }

    /// Next payload from the client, skipping heartbeats
    pub async fn recv_payload(&mut self) -> Result<Value> {
        loop {
            match self.next_message().await? {
                Message::Text(text) => {
                    let payload: Value = serde_json::from_str(&text)?;
                    if payload["op"] != 1 {
                        return Ok(payload);
                    }
                }
                Message::Close(frame) => bail!("client closed: {frame:?}"),
                _ => {}
            }
        }
    }

    /// Next payload, which must carry `op`
    pub async fn expect_op(&mut self, op: u8) -> Result<Value> {
        let payload = self.recv_payload().await?;
        if payload["op"] != op {
            bail!("expected op {op}, got {payload}");
        }
        Ok(payload)
    }

    /// Read until the client sends a close frame, returning its code. The
    /// reply is flushed by one more read before the socket is dropped.
    pub async fn expect_close(mut self) -> Result<Option<u16>> {
        loop {
            if let Message::Close(frame) = self.next_message().await? {
                let _ = tokio::time::timeout(Duration::from_millis(100), self.socket.recv()).await;
                return Ok(frame.map(|frame| frame.code));
            }
        }
    }

    /// Keep reading in the background so pings are answered
    pub fn drain(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(Ok(message)) = self.socket.recv().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
        })
    }

    async fn next_message(&mut self) -> Result<Message> {
        tokio::time::timeout(TEST_TIMEOUT, self.socket.recv())
            .await
            .context("no message within timeout")?
            .context("socket closed")?
            .map_err(Into::into)
    }
}

/// Poll `check` until it holds or the test timeout expires
pub async fn eventually<F>(mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {TEST_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
