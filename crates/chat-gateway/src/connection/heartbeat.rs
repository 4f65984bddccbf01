//! Heartbeat scheduler
//!
//! Sends op 1 on its own task so a slow dispatch callback can never delay it.
//! The first beat is jittered by `interval * random[0, 1)`, later beats are
//! exactly one interval apart.

use super::session::SessionStore;
use crate::protocol::GatewayPayload;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Delay before the first heartbeat after Hello
#[must_use]
pub fn first_delay(interval: Duration, jitter: f64) -> Duration {
    let interval_ms = interval.as_millis() as u64;
    let delay_ms = (interval_ms as f64 * jitter.clamp(0.0, 1.0)).floor() as u64;
    Duration::from_millis(delay_ms.min(interval_ms.saturating_sub(1)))
}

#[derive(Debug, Default)]
struct StatsInner {
    sent: u64,
    acked: u64,
    last_sent: Option<Instant>,
    last_ack: Option<Instant>,
    latency: Option<Duration>,
}

/// Heartbeat counters, shared between the scheduler and the receive loop
///
/// ACKs are recorded for observability only; a missing ACK does not close
/// the connection.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatStats {
    inner: Arc<Mutex<StatsInner>>,
}

impl HeartbeatStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&self) {
        let mut inner = self.inner.lock();
        inner.sent += 1;
        inner.last_sent = Some(Instant::now());
    }

    pub(crate) fn record_ack(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.acked += 1;
        inner.last_ack = Some(now);
        if let Some(sent) = inner.last_sent {
            inner.latency = Some(now.saturating_duration_since(sent));
        }
    }

    /// Time between the last heartbeat and its ACK
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.inner.lock().latency
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.inner.lock().sent
    }

    #[must_use]
    pub fn acked(&self) -> u64 {
        self.inner.lock().acked
    }

    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> {
        self.inner.lock().last_ack
    }
}

/// Periodic heartbeat sender for one socket
pub struct HeartbeatScheduler {
    interval: Duration,
    outbound: mpsc::Sender<Message>,
    session: SessionStore,
    stats: HeartbeatStats,
}

impl HeartbeatScheduler {
    #[must_use]
    pub fn new(
        interval: Duration,
        outbound: mpsc::Sender<Message>,
        session: SessionStore,
        stats: HeartbeatStats,
    ) -> Self {
        Self {
            interval,
            outbound,
            session,
            stats,
        }
    }

    /// Start with a random first delay
    pub fn start(self) -> HeartbeatHandle {
        let delay = first_delay(self.interval, rand::random::<f64>());
        self.start_after(delay)
    }

    /// Start with an explicit first delay
    pub fn start_after(self, first: Duration) -> HeartbeatHandle {
        tracing::debug!(
            interval_ms = self.interval.as_millis() as u64,
            first_ms = first.as_millis() as u64,
            "Starting heartbeat"
        );
        HeartbeatHandle {
            task: tokio::spawn(self.run(first)),
        }
    }

    async fn run(self, first: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let sequence = self.session.sequence();
            let text = match GatewayPayload::heartbeat(sequence).to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode heartbeat");
                    continue;
                }
            };
            if self.outbound.send(Message::Text(text)).await.is_err() {
                tracing::debug!("Writer closed, stopping heartbeat");
                break;
            }
            self.stats.record_sent();
            tracing::trace!(seq = ?sequence, "Heartbeat sent");
        }
    }
}

/// Running heartbeat. Stops when dropped.
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
