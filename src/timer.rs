//! Retransmit timing and retry budget.
//!
//! The sender waits a fixed [`TimerConfig::ack_timeout`] for each ACK.  Every
//! expiry without an acceptable ACK spends one unit of the [`RetryBudget`];
//! any acceptable ACK refills it.  When the budget is spent the session is
//! abandoned.
//!
//! The deadline is the same for every wait; there is no RTT estimation or
//! back-off.

use std::time::Duration;

/// Default wait for an acknowledgement before the window is resent.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of consecutive timeouts after which the sender gives up.
pub const MAX_TIMEOUTS: u32 = 5;

/// Default time the client waits for any datagram from the server.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Adjustable timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Sender: how long to wait for one ACK.
    pub ack_timeout: Duration,
    /// Sender: consecutive timeouts that abort the session.
    pub max_timeouts: u32,
    /// Receiver: silence after which the client abandons the transfer.
    pub idle_timeout: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ack_timeout: ACK_TIMEOUT,
            max_timeouts: MAX_TIMEOUTS,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

/// Counts consecutive timeouts for one session.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    consecutive: u32,
    limit: u32,
}

impl RetryBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    /// Record one expiry.  Returns `true` once the budget is exhausted.
    pub fn on_timeout(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }

    /// An acceptable ACK arrived.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Timeouts since the last reset.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
