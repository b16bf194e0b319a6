//! Server session-admission state.
//!
//! The transfer engines know nothing about admission; the server keeps this
//! small state machine to decide which datagrams belong to the running
//! session and which `Request`s must be rejected.
//!
//! ```text
//!   IDLE ──Request accepted──▶ TRANSFERRING { peer }
//!    ▲                               │
//!    └──── success / abort ──────────┘
//! ```

use std::fmt;
use std::net::SocketAddr;

/// Whether the server is free to accept a new transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session is running.
    #[default]
    Idle,
    /// A session with `peer` owns the window state.
    Transferring { peer: SocketAddr },
}

impl SessionState {
    /// Claim the server for `peer`.
    pub fn begin(&mut self, peer: SocketAddr) {
        *self = SessionState::Transferring { peer };
    }

    /// Release the server after a session ends, however it ended.
    pub fn release(&mut self) {
        *self = SessionState::Idle;
    }

    /// The peer being served, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            SessionState::Idle => None,
            SessionState::Transferring { peer } => Some(*peer),
        }
    }

    /// `true` when `addr` is the peer of the running session.
    pub fn is_serving(&self, addr: SocketAddr) -> bool {
        self.peer() == Some(addr)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Transferring { peer } => write!(f, "transferring to {peer}"),
        }
    }
}
