//! Session state
//!
//! The resumable part of a gateway connection. Updates are copy-on-write:
//! readers get an immutable snapshot, the receive loop swaps in a new value.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Snapshot of the resumable session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Gateway URL from the bootstrap call
    pub gateway_url: Option<String>,
    /// Last sequence number received
    pub sequence: Option<u64>,
    /// Session id from READY
    pub session_id: Option<String>,
    /// Resume URL from READY
    pub resume_url: Option<String>,
    /// Set while a resume is pending
    #[serde(default)]
    pub resuming: bool,
}

impl SessionState {
    /// Check if this state holds enough to attempt a resume
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// URL for the next socket: the resume URL while resuming, otherwise the
    /// bootstrap URL
    #[must_use]
    pub fn connect_url(&self) -> Option<&str> {
        if self.resuming {
            self.resume_url.as_deref().or(self.gateway_url.as_deref())
        } else {
            self.gateway_url.as_deref()
        }
    }

    /// Drop everything tied to the current session
    pub fn invalidate(&mut self) {
        self.sequence = None;
        self.session_id = None;
        self.resume_url = None;
        self.resuming = false;
    }
}

/// Shared holder of the current `SessionState`
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Arc<SessionState>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    /// Current session snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<SessionState> {
        Arc::clone(&self.inner.read())
    }

    /// Last received sequence number
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.inner.read().sequence
    }

    /// Replace the session with a modified copy
    pub(crate) fn update<F>(&self, f: F) -> Arc<SessionState>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut guard = self.inner.write();
        let mut next = SessionState::clone(&guard);
        f(&mut next);
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        next
    }

    pub(crate) fn replace(&self, state: SessionState) {
        *self.inner.write() = Arc::new(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state() {
        let state = SessionState::default();
        assert!(!state.can_resume());
        assert!(state.connect_url().is_none());
    }

    #[test]
    fn test_connect_url_prefers_resume_url_when_resuming() {
        let mut state = SessionState {
            gateway_url: Some("wss://gateway".to_string()),
            resume_url: Some("wss://resume".to_string()),
            session_id: Some("abc".to_string()),
            ..SessionState::default()
        };
        assert_eq!(state.connect_url(), Some("wss://gateway"));

        state.resuming = true;
        assert_eq!(state.connect_url(), Some("wss://resume"));

        state.resume_url = None;
        assert_eq!(state.connect_url(), Some("wss://gateway"));
    }

    #[test]
    fn test_invalidate_keeps_gateway_url() {
        let mut state = SessionState {
            gateway_url: Some("wss://gateway".to_string()),
            sequence: Some(10),
            session_id: Some("abc".to_string()),
            resume_url: Some("wss://resume".to_string()),
            resuming: true,
        };
        state.invalidate();

        assert_eq!(state.gateway_url.as_deref(), Some("wss://gateway"));
        assert_eq!(state.sequence, None);
        assert_eq!(state.session_id, None);
        assert!(!state.resuming);
    }

    #[test]
    fn test_update_is_copy_on_write() {
        let store = SessionStore::default();
        let before = store.snapshot();

        store.update(|state| state.sequence = Some(5));
        let after = store.snapshot();

        assert_eq!(before.sequence, None);
        assert_eq!(after.sequence, Some(5));
        assert_eq!(store.sequence(), Some(5));
    }

    #[test]
    fn test_sequence_tracks_last_seen() {
        let store = SessionStore::default();
        for seq in 1..=20 {
            store.update(|state| state.sequence = Some(seq));
        }
        assert_eq!(store.sequence(), Some(20));
    }

    #[test]
    fn test_clones_share_state() {
        let store = SessionStore::default();
        let other = store.clone();
        store.replace(SessionState {
            session_id: Some("abc".to_string()),
            ..SessionState::default()
        });
        assert!(other.snapshot().can_resume());
    }
}
