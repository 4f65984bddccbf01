//! Gateway handle
//!
//! Cloneable control surface for a running `GatewayConnection`.

use super::heartbeat::HeartbeatStats;
use super::options::GatewayOptions;
use super::session::{SessionState, SessionStore};
use super::status::ConnectionStatus;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::PresencePayload;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Requests from handles to the run loop
#[derive(Debug)]
pub(crate) enum Command {
    Close { done: oneshot::Sender<()> },
    Ping { reply: oneshot::Sender<GatewayResult<Duration>> },
    UpdatePresence(PresencePayload),
}

impl Command {
    /// Answer a command that arrived while no socket is open
    pub(crate) fn reject(self) {
        match self {
            Self::Ping { reply } => {
                let _ = reply.send(Err(GatewayError::ConnectionClosed));
            }
            Self::Close { .. } | Self::UpdatePresence(_) => {}
        }
    }
}

/// Handle to a gateway connection
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) options: Arc<RwLock<GatewayOptions>>,
    pub(crate) session: SessionStore,
    pub(crate) status: watch::Receiver<ConnectionStatus>,
    pub(crate) stats: HeartbeatStats,
}

impl GatewayHandle {
    /// Close the connection with code 1000 and wait for the run loop to stop
    pub async fn close(&self) -> GatewayResult<()> {
        if self.status() == ConnectionStatus::Terminated {
            return Ok(());
        }
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Close { done }).is_err() {
            return Ok(());
        }
        // The sender is dropped without a value if the loop exits on its own
        let _ = finished.await;
        Ok(())
    }

    /// Round-trip latency of a WebSocket ping
    pub async fn ping(&self) -> GatewayResult<Duration> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Ping { reply })
            .map_err(|_| GatewayError::ConnectionClosed)?;

        let timeout = self.options.read().ping_timeout;
        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::ConnectionClosed),
            Err(_) => Err(GatewayError::Timeout("ping")),
        }
    }

    /// Send a presence update and keep it for the next Identify
    pub fn update_presence(&self, presence: PresencePayload) -> GatewayResult<()> {
        self.options.write().presence = Some(presence.clone());
        self.commands
            .send(Command::UpdatePresence(presence))
            .map_err(|_| GatewayError::ConnectionClosed)
    }

    /// Change options used by the next Identify or Resume
    pub fn set_options<F>(&self, f: F)
    where
        F: FnOnce(&mut GatewayOptions),
    {
        f(&mut self.options.write());
    }

    /// Copy of the current options
    #[must_use]
    pub fn options(&self) -> GatewayOptions {
        self.options.read().clone()
    }

    /// Current session snapshot
    #[must_use]
    pub fn session(&self) -> Arc<SessionState> {
        self.session.snapshot()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Latency between the last heartbeat and its ACK
    #[must_use]
    pub fn heartbeat_latency(&self) -> Option<Duration> {
        self.stats.latency()
    }

    #[must_use]
    pub fn heartbeat_stats(&self) -> &HeartbeatStats {
        &self.stats
    }
}
