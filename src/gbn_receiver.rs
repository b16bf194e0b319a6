//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order** chunks are accepted (seq == `expected_seq`).
//! - Out-of-order or duplicate chunks are **silently discarded**: no write
//!   and no ACK.  The missing ACK is what makes the sender time out and go
//!   back.
//! - An accepted chunk shorter than [`MAX_PAYLOAD`] ends the stream.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (same pattern as [`crate::gbn_sender::GbnSender`]).

use crate::packet::MAX_PAYLOAD;

/// What the caller must do with an inbound `Data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Write the payload, ACK `seq`, keep receiving.
    Accept { seq: u8 },
    /// Write the payload (if any), ACK `seq`, the transfer is complete.
    Final { seq: u8 },
    /// Neither write nor ACK.
    Discard,
}

/// Go-Back-N receive-side state for one transfer.
#[derive(Debug, Default)]
pub struct GbnReceiver {
    /// Next sequence number to accept.
    pub expected_seq: u8,

    /// Accepted chunks so far, including the final one.
    pub chunks: u64,

    /// Accepted payload bytes so far.
    pub bytes: u64,

    done: bool,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify an inbound chunk and advance state when it is accepted.
    pub fn on_data(&mut self, seq: u8, payload: &[u8]) -> Delivery {
        if !self.expects(seq) {
            return Delivery::Discard;
        }
        self.chunks += 1;
        self.bytes += payload.len() as u64;
        if payload.len() < MAX_PAYLOAD {
            self.done = true;
            Delivery::Final { seq }
        } else {
            self.expected_seq = self.expected_seq.wrapping_add(1);
            Delivery::Accept { seq }
        }
    }

    /// `true` when `seq` is the chunk [`on_data`](Self::on_data) would accept.
    pub fn expects(&self, seq: u8) -> bool {
        !self.done && seq == self.expected_seq
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
