//! Gateway connection
//!
//! Owns the socket and runs the connect, identify, resume and reconnect
//! state machine. Dispatch payloads go to a worker task so user callbacks
//! never stall the receive loop or the heartbeat.

use super::bootstrap::{ConnectionMetadata, GatewayBootstrap};
use super::handle::{Command, GatewayHandle};
use super::heartbeat::{HeartbeatHandle, HeartbeatScheduler, HeartbeatStats};
use super::options::GatewayOptions;
use super::session::{SessionState, SessionStore};
use super::status::ConnectionStatus;
use crate::dispatch::{DispatchEvent, DispatchSink};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{GatewayEventType, ReadyEvent, ReadySession};
use crate::protocol::{CloseAction, GatewayPayload, OpCode, FRESH_RECONNECT, NORMAL_CLOSE};
use chat_common::TransportErrorPolicy;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, OnceCell};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel buffer size for outgoing frames
const OUTBOUND_BUFFER_SIZE: usize = 100;

/// How long to wait for the peer to answer our close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Close code the client sends before resuming
const RESUME_CLOSE: u16 = 4000;

const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Why a socket's receive loop ended
enum Outcome {
    /// `close()` was called
    Shutdown(oneshot::Sender<()>),
    /// Server closed with 1000
    Terminated,
    Reconnect(CloseAction),
    Failed(GatewayError),
}

struct PendingPing {
    payload: Vec<u8>,
    started: Instant,
    reply: oneshot::Sender<GatewayResult<Duration>>,
}

/// State that lives as long as one socket
struct Socket {
    outbound: mpsc::Sender<Message>,
    heartbeat: Option<HeartbeatHandle>,
    pings: Vec<PendingPing>,
    next_ping: u64,
    sent_close: bool,
    hello_received: bool,
}

impl Socket {
    fn new(outbound: mpsc::Sender<Message>) -> Self {
        Self {
            outbound,
            heartbeat: None,
            pings: Vec::new(),
            next_ping: 0,
            sent_close: false,
            hello_received: false,
        }
    }

    async fn send(&self, payload: &GatewayPayload) {
        let text = match payload.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(op = %payload.op, error = %e, "Failed to encode payload");
                return;
            }
        };
        if self.outbound.send(Message::Text(text)).await.is_err() {
            tracing::debug!(op = %payload.op, "Writer closed, payload dropped");
        }
    }

    async fn send_close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: Cow::Borrowed(""),
        };
        if self.outbound.send(Message::Close(Some(frame))).await.is_ok() {
            self.sent_close = true;
        }
    }

    async fn ping(&mut self, reply: oneshot::Sender<GatewayResult<Duration>>) {
        self.next_ping += 1;
        let payload = self.next_ping.to_be_bytes().to_vec();
        if self.outbound.send(Message::Ping(payload.clone())).await.is_err() {
            let _ = reply.send(Err(GatewayError::ConnectionClosed));
            return;
        }
        self.pings.push(PendingPing {
            payload,
            started: Instant::now(),
            reply,
        });
    }

    fn resolve_ping(&mut self, payload: &[u8]) {
        if let Some(index) = self.pings.iter().position(|ping| ping.payload == payload) {
            let ping = self.pings.swap_remove(index);
            let _ = ping.reply.send(Ok(ping.started.elapsed()));
        }
    }
}

/// A single logical gateway session, kept alive across sockets
pub struct GatewayConnection {
    options: Arc<RwLock<GatewayOptions>>,
    bootstrap: Arc<dyn GatewayBootstrap>,
    metadata: OnceCell<ConnectionMetadata>,
    session: SessionStore,
    stats: HeartbeatStats,
    status: watch::Sender<ConnectionStatus>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl GatewayConnection {
    #[must_use]
    pub fn new(options: GatewayOptions, bootstrap: Arc<dyn GatewayBootstrap>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            options: Arc::new(RwLock::new(options)),
            bootstrap,
            metadata: OnceCell::new(),
            session: SessionStore::default(),
            stats: HeartbeatStats::new(),
            status,
            commands_tx,
            commands,
        }
    }

    /// Restore a session persisted by an earlier process. The first socket
    /// resumes it instead of identifying.
    #[must_use]
    pub fn with_session(self, state: SessionState) -> Self {
        let resuming = state.can_resume();
        self.session.replace(SessionState { resuming, ..state });
        self
    }

    #[must_use]
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            commands: self.commands_tx.clone(),
            options: Arc::clone(&self.options),
            session: self.session.clone(),
            status: self.status.subscribe(),
            stats: self.stats.clone(),
        }
    }

    #[must_use]
    pub fn session(&self) -> Arc<SessionState> {
        self.session.snapshot()
    }

    /// Connection metadata, fetched on first use and cached afterwards.
    /// A failed fetch is not cached.
    pub async fn connection_metadata(&self) -> GatewayResult<&ConnectionMetadata> {
        self.metadata
            .get_or_try_init(|| async {
                let token = self.options.read().token.clone();
                let metadata = self.bootstrap.fetch_connection_metadata(&token).await?;
                tracing::debug!(
                    url = %metadata.url,
                    shards = metadata.shards,
                    remaining = metadata.session_start_limit.remaining,
                    "Fetched connection metadata"
                );
                Ok(metadata)
            })
            .await
    }

    /// Run until `close()`, a normal close from the server, or a fatal error
    pub async fn run(mut self, sink: Arc<dyn DispatchSink>) -> GatewayResult<()> {
        let (events, queue) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_worker(queue, sink));

        let result = self.run_loop(&events).await;
        // Queued events still reach the sink before the worker exits
        drop(events);
        self.set_status(ConnectionStatus::Terminated);

        match result {
            Ok(done) => {
                tracing::info!("Gateway connection closed");
                if let Some(done) = done {
                    let _ = done.send(());
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Gateway connection failed");
                Err(e)
            }
        }
    }

    async fn run_loop(
        &mut self,
        events: &mpsc::UnboundedSender<DispatchEvent>,
    ) -> GatewayResult<Option<oneshot::Sender<()>>> {
        let mut failures: u32 = 0;
        let mut connected = false;
        loop {
            let stream = match self.open_socket().await {
                Ok(stream) => stream,
                Err(e) if connected && self.retries(&e) => {
                    failures += 1;
                    let delay = backoff(failures);
                    tracing::warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect failed"
                    );
                    self.set_status(ConnectionStatus::Reconnecting);
                    if let Some(done) = self.wait(delay).await {
                        self.session.update(SessionState::invalidate);
                        return Ok(Some(done));
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            connected = true;
            let (outcome, hello_received) = self.drive(stream, events).await;
            failures = if hello_received { 0 } else { failures + 1 };

            match outcome {
                Outcome::Shutdown(done) => {
                    self.session.update(SessionState::invalidate);
                    return Ok(Some(done));
                }
                Outcome::Terminated => {
                    self.session.update(SessionState::invalidate);
                    return Ok(None);
                }
                Outcome::Failed(e) => return Err(e),
                Outcome::Reconnect(action) => {
                    self.prepare_reconnect(action);
                    let delay = backoff(failures);
                    if !delay.is_zero() {
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                        if let Some(done) = self.wait(delay).await {
                            self.session.update(SessionState::invalidate);
                            return Ok(Some(done));
                        }
                    }
                }
            }
        }
    }

    async fn open_socket(&self) -> GatewayResult<WsStream> {
        self.set_status(ConnectionStatus::Connecting);
        let metadata = self.connection_metadata().await?;
        let snapshot = self.session.update(|state| {
            if state.gateway_url.is_none() {
                state.gateway_url = Some(metadata.url.clone());
            }
        });

        let base = snapshot.connect_url().unwrap_or(metadata.url.as_str());
        let url = self.options.read().socket_url(base);
        tracing::info!(url = %url, resuming = snapshot.resuming, "Connecting to gateway");

        let (stream, _response) = connect_async(url.as_str()).await?;
        self.set_status(ConnectionStatus::AwaitingHello);
        Ok(stream)
    }

    /// Receive loop for one socket
    async fn drive(
        &mut self,
        stream: WsStream,
        events: &mpsc::UnboundedSender<DispatchEvent>,
    ) -> (Outcome, bool) {
        let (mut sink, mut frames) = stream.split();
        let (outbound, mut queue) = mpsc::channel::<Message>(OUTBOUND_BUFFER_SIZE);

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::debug!(error = %e, "Failed to write frame");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let mut socket = Socket::new(outbound);
        let outcome = loop {
            tokio::select! {
                frame = frames.next() => {
                    if let Some(outcome) = self.on_frame(frame, &mut socket, events).await {
                        break outcome;
                    }
                }
                Some(command) = self.commands.recv() => {
                    if let Some(outcome) = self.on_command(command, &mut socket).await {
                        break outcome;
                    }
                }
            }
        };

        let hello_received = socket.hello_received;
        let sent_close = socket.sent_close;
        // Stops the heartbeat and fails pending pings
        drop(socket);

        if sent_close {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
                while let Some(Ok(frame)) = frames.next().await {
                    if matches!(frame, Message::Close(_)) {
                        break;
                    }
                }
            })
            .await;
        }
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer).await;

        (outcome, hello_received)
    }

    async fn on_frame(
        &self,
        frame: Option<Result<Message, tungstenite::Error>>,
        socket: &mut Socket,
        events: &mpsc::UnboundedSender<DispatchEvent>,
    ) -> Option<Outcome> {
        match frame {
            Some(Ok(Message::Text(text))) => self.on_text(&text, socket, events).await,
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!("Unexpected binary frame");
                Some(self.protocol_violation(socket).await)
            }
            Some(Ok(Message::Pong(payload))) => {
                socket.resolve_ping(&payload);
                None
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((None, String::new()), |frame| {
                    (Some(u16::from(frame.code)), frame.reason.into_owned())
                });
                Some(self.on_close(code, &reason))
            }
            // Pings are answered by tungstenite
            Some(Ok(_)) => None,
            Some(Err(e)) => Some(self.on_transport_error(e)),
            None => Some(self.on_close(None, "")),
        }
    }

    async fn on_text(
        &self,
        text: &str,
        socket: &mut Socket,
        events: &mpsc::UnboundedSender<DispatchEvent>,
    ) -> Option<Outcome> {
        let payload = match GatewayPayload::from_json(text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode gateway payload");
                return Some(self.protocol_violation(socket).await);
            }
        };

        if !payload.op.is_receivable() {
            tracing::warn!(op = %payload.op, "Unexpected op code from server");
            return Some(self.protocol_violation(socket).await);
        }

        if let Some(sequence) = payload.s {
            self.session.update(|state| state.sequence = Some(sequence));
        }
        tracing::trace!(op = %payload.op, seq = ?payload.s, event = ?payload.t, "Received payload");

        match payload.op {
            OpCode::Hello => {
                let Some(hello) = payload.as_hello() else {
                    tracing::warn!("Malformed Hello payload");
                    return Some(self.protocol_violation(socket).await);
                };
                if hello.heartbeat_interval == 0 {
                    tracing::warn!("Hello with a zero heartbeat interval");
                    return Some(self.protocol_violation(socket).await);
                }
                self.on_hello(hello.heartbeat_interval, socket).await;
                None
            }
            OpCode::Heartbeat => {
                socket
                    .send(&GatewayPayload::heartbeat(self.session.sequence()))
                    .await;
                self.stats.record_sent();
                tracing::trace!("Heartbeat requested by server");
                None
            }
            OpCode::Reconnect => {
                tracing::info!("Server requested reconnect");
                Some(Self::close_for(socket, RESUME_CLOSE, CloseAction::Resume).await)
            }
            OpCode::InvalidSession => {
                if payload.as_invalid_session().unwrap_or(false) {
                    tracing::info!("Session invalidated, resuming");
                    Some(Self::close_for(socket, RESUME_CLOSE, CloseAction::Resume).await)
                } else {
                    tracing::warn!("Session invalidated, identifying again");
                    Some(Self::close_for(socket, FRESH_RECONNECT, CloseAction::ReconnectFresh).await)
                }
            }
            OpCode::HeartbeatAck => {
                self.stats.record_ack();
                tracing::trace!(latency = ?self.stats.latency(), "Heartbeat acknowledged");
                None
            }
            OpCode::Dispatch => {
                self.on_dispatch(payload, events);
                None
            }
            OpCode::Identify | OpCode::PresenceUpdate | OpCode::Resume => None,
        }
    }

    async fn on_hello(&self, interval_ms: u64, socket: &mut Socket) {
        socket.hello_received = true;
        let heartbeat = HeartbeatScheduler::new(
            Duration::from_millis(interval_ms),
            socket.outbound.clone(),
            self.session.clone(),
            self.stats.clone(),
        )
        .start();
        if let Some(previous) = socket.heartbeat.replace(heartbeat) {
            previous.stop();
        }

        let session = self.session.snapshot();
        let options = self.options.read().clone();
        let resume_id = session
            .session_id
            .as_deref()
            .filter(|_| session.resuming);

        let payload = if let Some(session_id) = resume_id {
            self.set_status(ConnectionStatus::Resuming);
            tracing::info!(session_id = %session_id, seq = ?session.sequence, "Sending resume");
            GatewayPayload::resume(&options.resume_payload(session_id, session.sequence))
        } else {
            self.set_status(ConnectionStatus::Identifying);
            tracing::info!(intents = options.intents.bits(), "Sending identify");
            GatewayPayload::identify(&options.identify_payload())
        };

        match payload {
            Ok(payload) => socket.send(&payload).await,
            Err(e) => tracing::error!(error = %e, "Failed to encode handshake payload"),
        }
    }

    fn on_dispatch(&self, payload: GatewayPayload, events: &mpsc::UnboundedSender<DispatchEvent>) {
        let Some(name) = payload.t else {
            tracing::warn!(seq = ?payload.s, "Dispatch without event name");
            return;
        };

        match GatewayEventType::from_name(&name) {
            Some(GatewayEventType::Ready) => self.on_ready(&payload.d),
            Some(GatewayEventType::Resumed) => {
                let state = self.session.update(|state| state.resuming = false);
                self.set_status(ConnectionStatus::Connected);
                tracing::info!(session_id = ?state.session_id, seq = ?state.sequence, "Session resumed");
            }
            _ => {}
        }

        let event = DispatchEvent::new(name, payload.s, payload.d);
        if events.send(event).is_err() {
            tracing::debug!("Dispatch worker stopped, event dropped");
        }
    }

    fn on_ready(&self, data: &Value) {
        let ready = match ReadySession::deserialize(data) {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!(error = %e, "READY without a session id");
                return;
            }
        };
        self.session.update(|state| {
            state.session_id = Some(ready.session_id.clone());
            state.resume_url = ready.resume_gateway_url.clone();
            state.resuming = false;
        });
        self.set_status(ConnectionStatus::Connected);

        match ReadyEvent::deserialize(data) {
            Ok(event) => tracing::info!(
                session_id = %ready.session_id,
                guilds = event.guilds.len(),
                "Gateway ready"
            ),
            Err(e) => tracing::info!(
                session_id = %ready.session_id,
                error = %e,
                "Gateway ready, READY body not fully understood"
            ),
        }
    }

    async fn on_command(&self, command: Command, socket: &mut Socket) -> Option<Outcome> {
        match command {
            Command::Close { done } => {
                self.set_status(ConnectionStatus::Closing);
                tracing::info!("Closing gateway connection");
                socket.send_close(NORMAL_CLOSE).await;
                Some(Outcome::Shutdown(done))
            }
            Command::Ping { reply } => {
                socket.ping(reply).await;
                None
            }
            Command::UpdatePresence(presence) => {
                // Not yet identified: the stored presence goes out with Identify
                if *self.status.borrow() != ConnectionStatus::Connected {
                    return None;
                }
                match GatewayPayload::presence_update(&presence) {
                    Ok(payload) => socket.send(&payload).await,
                    Err(e) => tracing::error!(error = %e, "Failed to encode presence"),
                }
                None
            }
        }
    }

    fn on_close(&self, code: Option<u16>, reason: &str) -> Outcome {
        let action = CloseAction::classify(code);
        match action {
            CloseAction::Terminate => {
                tracing::info!(code = ?code, "Gateway closed normally");
                Outcome::Terminated
            }
            CloseAction::Fatal => {
                tracing::error!(code = ?code, reason, "Gateway closed with fatal code");
                Outcome::Failed(GatewayError::from_close(code.unwrap_or_default(), reason))
            }
            CloseAction::Resume | CloseAction::ReconnectFresh => {
                tracing::warn!(code = ?code, reason, action = ?action, "Gateway connection closed");
                Outcome::Reconnect(action)
            }
        }
    }

    fn on_transport_error(&self, error: tungstenite::Error) -> Outcome {
        if matches!(
            error,
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
        ) {
            return self.on_close(None, "");
        }

        let policy = self.options.read().transport_error_policy;
        match policy {
            TransportErrorPolicy::Propagate => Outcome::Failed(GatewayError::Transport(error)),
            TransportErrorPolicy::Reconnect => {
                tracing::warn!(error = %error, "Transport error, resuming");
                Outcome::Reconnect(CloseAction::Resume)
            }
        }
    }

    /// Whether a failed reconnect is retried. The first socket of a run
    /// always propagates its error.
    fn retries(&self, error: &GatewayError) -> bool {
        matches!(error, GatewayError::Transport(_))
            && self.options.read().transport_error_policy == TransportErrorPolicy::Reconnect
    }

    /// Unparsable frame or unexpected op code: close and resume
    async fn protocol_violation(&self, socket: &mut Socket) -> Outcome {
        Self::close_for(socket, RESUME_CLOSE, CloseAction::Resume).await
    }

    async fn close_for(socket: &mut Socket, code: u16, action: CloseAction) -> Outcome {
        socket.send_close(code).await;
        Outcome::Reconnect(action)
    }

    fn prepare_reconnect(&self, action: CloseAction) {
        self.set_status(ConnectionStatus::Reconnecting);
        let state = self.session.update(|state| match action {
            CloseAction::Resume if state.can_resume() => state.resuming = true,
            _ => state.invalidate(),
        });

        if state.resuming {
            tracing::info!(session_id = ?state.session_id, seq = ?state.sequence, "Reconnecting to resume session");
        } else {
            tracing::info!("Reconnecting with a new session");
        }
    }

    /// Sleep between reconnects while still answering commands
    async fn wait(&mut self, delay: Duration) -> Option<oneshot::Sender<()>> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return None,
                Some(command) = self.commands.recv() => match command {
                    Command::Close { done } => return Some(done),
                    other => other.reject(),
                },
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "Connection status changed");
        }
    }
}

async fn dispatch_worker(
    mut queue: mpsc::UnboundedReceiver<DispatchEvent>,
    sink: Arc<dyn DispatchSink>,
) {
    while let Some(event) = queue.recv().await {
        sink.dispatch(event);
    }
}

/// Delay before reconnecting after `failures` sockets in a row closed
/// before Hello
fn backoff(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1_u32 << (failures - 1).min(6);
    BASE_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}
