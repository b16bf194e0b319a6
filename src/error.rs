//! Session-level error taxonomy.

use std::net::SocketAddr;

use thiserror::Error;

use crate::socket::SocketError;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Why a transfer session ended unsuccessfully.
///
/// Packet-level anomalies never surface here; the engines drop malformed
/// and out-of-order datagrams on the spot.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The requested file does not exist or cannot be opened.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The requested name escapes the source directory or is not a plain name.
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    /// Requested window size outside 1..=9.
    #[error("window size {0} outside 1..=9")]
    InvalidWindow(u8),

    /// The sender gave up after this many consecutive timeouts.
    #[error("no acknowledgement after {0} consecutive timeouts")]
    RetryExhausted(u32),

    /// The server answered with an `Error` packet.
    #[error("server reported an error")]
    RemoteError,

    /// The client heard nothing from the server for too long.
    #[error("no datagram from {0} within the idle timeout")]
    PeerSilent(SocketAddr),

    /// Send or receive failed for a reason other than a timeout.
    #[error("transport failure: {0}")]
    Transport(#[from] SocketError),

    /// Reading the source or writing the sink failed.
    #[error("byte stream failure: {0}")]
    Stream(#[from] std::io::Error),
}
