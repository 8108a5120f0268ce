//! Session lifecycle state machine.
//!
//! ```text
//! Created ──► Connecting ──► Connected ──► Closing ──► Closed
//!    │            │                           ▲
//!    └────────────┴───────────────────────────┘
//! ```
//!
//! Transitions only move forward. A session that left `Created` can never
//! connect again.

use std::fmt;
use std::sync::Mutex;

/// Observable lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no socket yet
    Created,
    /// TCP connect or proxy handshake in progress
    Connecting,
    /// Socket open and read loop running
    Connected,
    /// Teardown in progress
    Closing,
    /// Terminal; the session must be discarded
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Connecting)
                | (Created, Closing)
                | (Connecting, Connected)
                | (Connecting, Closing)
                | (Connected, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared, lock-protected state cell
#[derive(Debug)]
pub(crate) struct StateCell {
    inner: Mutex<SessionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SessionState::Created),
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if legal. Returns the previous state, or the current
    /// state unchanged when the transition is rejected.
    pub(crate) fn advance(&self, next: SessionState) -> Result<SessionState, SessionState> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let current = *state;
        if current.can_transition_to(next) {
            *state = next;
            Ok(current)
        } else {
            Err(current)
        }
    }
}
