//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` occupied slots, each
//! holding one chunk of the file.  Multiple chunks may be outstanding at once.
//!
//! # Protocol contract
//!
//! - At most `window_size` slots are occupied (sent or not) at any instant.
//! - ACKs are **cumulative**: `Ack(S)` releases every slot up to and
//!   including sequence `S`.
//! - On timeout, **every** occupied slot is marked unsent so the whole
//!   window goes out again (go back N); there is no selective repair.
//! - A chunk shorter than [`MAX_PAYLOAD`] is the last one; once it has been
//!   allocated no further chunks are read.
//!
//! Sequence numbers are tracked as a monotonically increasing `u64` and
//! truncated to a single byte on the wire.  A window never holds more than
//! nine slots, so the byte seen in an `Ack` maps back to exactly one slot.
//!
//! This module only manages state; all I/O is the caller's responsibility.

use std::collections::VecDeque;

use crate::packet::{encode_data, MAX_PAYLOAD};

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// One occupied position in the send window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Session-wide sequence number (not truncated).
    pub seq: u64,
    /// Chunk owned by this slot until it is acknowledged.
    pub payload: Vec<u8>,
    /// Whether the chunk has gone out since the last timeout.
    pub sent: bool,
    /// Total number of times this chunk has been transmitted.
    pub tx_count: u32,
}

impl Slot {
    /// The sequence number as it appears on the wire.
    pub fn wire_seq(&self) -> u8 {
        self.seq as u8
    }
}

/// An encoded `Data` datagram ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub seq: u64,
    pub bytes: Vec<u8>,
    /// `true` when this chunk had already been sent before.
    pub retransmission: bool,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transfer session.
///
/// # Sequence-number layout
///
/// ```text
///  window.front().seq      cumulative_seq_sent
///      │                          │
///  ────┼──────────────────────────┼──────────────▶ seq space
///      │ <── occupied slots ────▶ │ <── not yet read
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number the next allocated chunk will receive.
    pub cumulative_seq_sent: u64,

    /// Highest sequence acknowledged so far (`None` before the first ACK).
    pub cumulative_ack_num: Option<u64>,

    /// The final (short) chunk has been allocated.
    pub eof_seen: bool,

    /// Maximum number of occupied slots (N).
    window_size: usize,

    /// Occupied slots ordered by sequence number (front = oldest).
    window: VecDeque<Slot>,
}

impl GbnSender {
    /// Create the window state for a fresh session.
    ///
    /// `window_size` is the GBN window size N (≥ 1).
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            cumulative_seq_sent: 0,
            cumulative_ack_num: None,
            eof_seen: false,
            window_size,
            window: VecDeque::with_capacity(window_size),
        }
    }

    /// `true` when an empty slot exists and the stream has more to give.
    pub fn wants_chunk(&self) -> bool {
        !self.eof_seen && self.window.len() < self.window_size
    }

    /// Move `payload` into the next empty slot and return its sequence number.
    ///
    /// A payload shorter than [`MAX_PAYLOAD`] (including an empty one) marks
    /// end-of-stream.
    pub fn fill(&mut self, payload: Vec<u8>) -> u64 {
        debug_assert!(
            self.wants_chunk(),
            "fill called on a full or finished window ({} / {})",
            self.window.len(),
            self.window_size
        );
        let seq = self.cumulative_seq_sent;
        if payload.len() < MAX_PAYLOAD {
            self.eof_seen = true;
        }
        self.window.push_back(Slot {
            seq,
            payload,
            sent: false,
            tx_count: 0,
        });
        self.cumulative_seq_sent += 1;
        seq
    }

    /// Encode the oldest occupied slot that has not been sent and mark it
    /// sent.  Returns `None` once every occupied slot is on the wire.
    pub fn next_unsent(&mut self) -> Option<Transmission> {
        let slot = self.window.iter_mut().find(|s| !s.sent)?;
        slot.sent = true;
        slot.tx_count += 1;
        Some(Transmission {
            seq: slot.seq,
            bytes: encode_data(slot.wire_seq(), &slot.payload),
            retransmission: slot.tx_count > 1,
        })
    }

    /// Process a cumulative ACK carrying wire sequence `ack`.
    ///
    /// Releases every slot up to and including the one `ack` names, compacts
    /// the window and returns the number of released slots.  Returns `0` for
    /// an ACK outside the window (stale duplicate or nonsense), which leaves
    /// all state untouched.
    pub fn on_ack(&mut self, ack: u8) -> usize {
        let Some(base) = self.window.front().map(|s| s.seq) else {
            return 0;
        };
        let offset = ack.wrapping_sub(base as u8) as usize;
        match self.window.get(offset) {
            Some(slot) if slot.sent => {}
            _ => return 0,
        }

        let released = offset + 1;
        let mut last = base;
        for slot in self.window.drain(..released) {
            last = slot.seq;
        }
        self.cumulative_ack_num = Some(self.cumulative_ack_num.map_or(last, |n| n.max(last)));
        released
    }

    /// Mark every occupied slot unsent so the whole window is resent.
    ///
    /// Returns the number of slots that will go out again.
    pub fn on_timeout(&mut self) -> usize {
        for slot in self.window.iter_mut() {
            slot.sent = false;
        }
        self.window.len()
    }

    /// `true` once the final chunk is allocated and every allocated sequence
    /// has been acknowledged.
    pub fn finished(&self) -> bool {
        self.eof_seen && self.cumulative_ack_num == self.cumulative_seq_sent.checked_sub(1)
    }

    /// Number of occupied slots.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// Iterate over occupied slots from oldest to newest.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.window.iter()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
