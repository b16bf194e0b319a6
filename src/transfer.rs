//! The two transfer engines: Go-Back-N sender and in-order receiver.
//!
//! # Architecture
//!
//! ```text
//!   byte source                                         byte sink
//!  (AsyncRead)                                        (AsyncWrite)
//!      │ 512-byte chunks                                    ▲
//!      ▼                                                    │ in-order payloads
//!  send_file ── GbnSender ──▶ DATA ───────▶ GbnReceiver ── receive_file
//!      ▲                                                    │
//!      └────────────────────── ACK ◀────────────────────────┘
//!                 (both sides speak through a `Transport`)
//! ```
//!
//! Each engine is a single task that strictly alternates between sending and
//! one bounded wait for an inbound datagram.  There is no intra-session
//! concurrency, and each call builds its window state from scratch.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::{Result, TransferError};
use crate::gbn_receiver::{Delivery, GbnReceiver};
use crate::gbn_sender::GbnSender;
use crate::packet::{Packet, MAX_PAYLOAD};
use crate::simulator::AckLoss;
use crate::socket::{Recv, Transport};
use crate::timer::{RetryBudget, TimerConfig};

/// Counters describing a completed transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Chunks allocated (sender) or accepted (receiver), final one included.
    pub chunks: u64,
    /// Payload bytes read from the source or written to the sink.
    pub bytes: u64,
    /// Datagrams handed to the transport.
    pub packets_sent: u64,
    /// `Data` packets sent again after a timeout.
    pub retransmissions: u64,
    /// Waits that expired without an acceptable ACK.
    pub timeouts: u64,
    /// `Data` packets the receiver threw away.
    pub discarded: u64,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stream `source` to `peer` with a Go-Back-N window of `window_size`.
///
/// Returns once the final chunk has been sent and acknowledged.  Fails with
/// [`TransferError::RetryExhausted`] after `timer.max_timeouts` consecutive
/// waits without an acceptable ACK, or on any stream or transport error.
/// Every slot buffer is dropped on return, whatever the outcome.
pub async fn send_file<T, R>(
    transport: &mut T,
    peer: SocketAddr,
    source: &mut R,
    window_size: u8,
    timer: &TimerConfig,
) -> Result<TransferReport>
where
    T: Transport,
    R: AsyncRead + Unpin,
{
    if !crate::packet::valid_window(window_size) {
        return Err(TransferError::InvalidWindow(window_size));
    }

    let mut sender = GbnSender::new(window_size as usize);
    let mut budget = RetryBudget::new(timer.max_timeouts);
    let mut report = TransferReport::default();

    while !sender.finished() {
        // Step 1: refill empty slots from the byte stream.
        while sender.wants_chunk() {
            let chunk = read_chunk(source).await?;
            report.chunks += 1;
            report.bytes += chunk.len() as u64;
            let len = chunk.len();
            let seq = sender.fill(chunk);
            if len < MAX_PAYLOAD {
                log::debug!("[send] final chunk seq={seq} len={len}");
            }
        }

        // Step 2: transmit everything not yet on the wire.
        while let Some(tx) = sender.next_unsent() {
            transport.send_to(&tx.bytes, peer).await?;
            report.packets_sent += 1;
            if tx.retransmission {
                report.retransmissions += 1;
            }
            log::debug!(
                "[send] → DATA seq={} len={} resend={} in_flight={}",
                tx.seq,
                tx.bytes.len() - crate::packet::DATA_HEADER_LEN,
                tx.retransmission,
                sender.in_flight()
            );
        }

        // Step 3: wait for one acceptable ACK or the deadline.
        let deadline = Instant::now() + timer.ack_timeout;
        if await_ack(transport, peer, &mut sender, deadline).await? {
            budget.reset();
            continue;
        }

        report.timeouts += 1;
        if budget.on_timeout() {
            log::warn!(
                "[send] {} consecutive timeouts; abandoning transfer to {peer}",
                budget.consecutive()
            );
            return Err(TransferError::RetryExhausted(budget.consecutive()));
        }
        let n = sender.on_timeout();
        log::debug!(
            "[send] timeout {}/{}; going back {n} slot(s)",
            budget.consecutive(),
            timer.max_timeouts
        );
    }

    Ok(report)
}

/// Wait until `deadline` for an ACK from `peer` that moves the window.
///
/// Returns `Ok(true)` when the window advanced and `Ok(false)` on timeout.
/// Anything else (other senders, malformed datagrams, stale ACKs) is
/// dropped and the wait continues against the same deadline.
async fn await_ack<T: Transport>(
    transport: &mut T,
    peer: SocketAddr,
    sender: &mut GbnSender,
    deadline: Instant,
) -> Result<bool> {
    loop {
        let (bytes, from) = match transport.recv_until(deadline).await? {
            Recv::Timeout => return Ok(false),
            Recv::Datagram(bytes, from) => (bytes, from),
        };
        if from != peer {
            log::debug!("[send] dropping datagram from stranger {from}");
            continue;
        }
        match Packet::decode(&bytes) {
            Ok(Packet::Ack { seq }) => {
                let released = sender.on_ack(seq);
                if released > 0 {
                    log::debug!("[send] ← ACK seq={seq} released={released}");
                    return Ok(true);
                }
                log::debug!("[send] ← ACK seq={seq} outside window; ignored");
            }
            Ok(other) => log::debug!("[send] ignoring {} from peer", other.name()),
            Err(e) => log::debug!("[send] dropping malformed datagram: {e}"),
        }
    }
}

/// Read up to [`MAX_PAYLOAD`] bytes, stopping short only at end of stream.
async fn read_chunk<R: AsyncRead + Unpin>(source: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_PAYLOAD];
    let mut filled = 0;
    while filled < MAX_PAYLOAD {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Receive a file from `server` into `sink`, acknowledging each in-order
/// chunk.
///
/// Datagrams from any other address, malformed datagrams and out-of-order
/// chunks are dropped without a reply.  An `Error` packet from the server
/// ends the transfer with [`TransferError::RemoteError`]; going longer than
/// `timer.idle_timeout` without a well-formed datagram from `server` ends it
/// with [`TransferError::PeerSilent`], however much other traffic arrives.  In
/// both cases the caller owns cleanup of whatever reached `sink`.
///
/// `ack_loss` lists sequence numbers whose first in-order arrival is
/// treated as lost, for exercising the sender's timeout path.
pub async fn receive_file<T, W>(
    transport: &mut T,
    server: SocketAddr,
    sink: &mut W,
    timer: &TimerConfig,
    mut ack_loss: AckLoss,
) -> Result<TransferReport>
where
    T: Transport,
    W: AsyncWrite + Unpin,
{
    let mut receiver = GbnReceiver::new();
    let mut report = TransferReport::default();

    // Only a well-formed datagram from the server pushes the deadline back.
    let mut deadline = Instant::now() + timer.idle_timeout;
    loop {
        let (bytes, from) = match transport.recv_until(deadline).await? {
            Recv::Timeout => return Err(TransferError::PeerSilent(server)),
            Recv::Datagram(bytes, from) => (bytes, from),
        };
        if from != server {
            log::debug!("[recv] dropping datagram from stranger {from}");
            continue;
        }
        let packet = match Packet::decode(&bytes) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("[recv] dropping malformed datagram: {e}");
                continue;
            }
        };
        deadline = Instant::now() + timer.idle_timeout;

        let (seq, payload) = match packet {
            Packet::Data { seq, payload } => (seq, payload),
            Packet::Error => {
                log::warn!("[recv] ← ERROR from {server}");
                return Err(TransferError::RemoteError);
            }
            other => {
                log::debug!("[recv] ignoring {} from server", other.name());
                continue;
            }
        };

        if receiver.expects(seq) && ack_loss.take(seq) {
            log::info!("[recv] simulating loss of ACK {seq}");
            report.discarded += 1;
            continue;
        }

        match receiver.on_data(seq, &payload) {
            Delivery::Discard => {
                report.discarded += 1;
                log::debug!(
                    "[recv] ← DATA seq={seq} out of order (expected {}); discarded",
                    receiver.expected_seq
                );
            }
            Delivery::Accept { seq } => {
                sink.write_all(&payload).await?;
                send_ack(transport, server, seq, &mut report).await?;
                log::debug!("[recv] ← DATA seq={seq} len={}; → ACK", payload.len());
            }
            Delivery::Final { seq } => {
                if !payload.is_empty() {
                    sink.write_all(&payload).await?;
                }
                sink.flush().await?;
                send_ack(transport, server, seq, &mut report).await?;
                log::debug!("[recv] ← final DATA seq={seq} len={}; → ACK", payload.len());
                report.chunks = receiver.chunks;
                report.bytes = receiver.bytes;
                return Ok(report);
            }
        }
    }
}

async fn send_ack<T: Transport>(
    transport: &mut T,
    server: SocketAddr,
    seq: u8,
    report: &mut TransferReport,
) -> Result<()> {
    transport
        .send_to(&Packet::Ack { seq }.encode(), server)
        .await?;
    report.packets_sent += 1;
    Ok(())
}
