//! Wire-format definitions for the four protocol messages.
//!
//! Every datagram exchanged between client and server is a [`Packet`].  This
//! module is responsible for:
//! - Defining the on-wire binary layout of each message type.
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated or unrecognised input.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! Every field is a single byte, so there is no byte-order concern.
//!
//! ```text
//!  Request   +------+--------+---------------------------+
//!  (21 B)    | 0x01 | window | filename (19 B, NUL-pad)  |
//!            +------+--------+---------------------------+
//!  Data      +------+--------+---------------------------+
//!  (2+n B)   | 0x02 |  seq   | payload (0..=512 B)       |
//!            +------+--------+---------------------------+
//!  Ack       +------+--------+
//!  (2 B)     | 0x03 |  seq   |
//!            +------+--------+
//!  Error     +------+
//!  (1 B)     | 0x04 |
//!            +------+
//! ```
//!
//! A `Data` payload shorter than [`MAX_PAYLOAD`] marks the final chunk of a
//! transfer; there is no separate end-of-stream message.

/// Message type codes (first byte of every datagram).
pub mod kind {
    pub const REQUEST: u8 = 1;
    pub const DATA: u8 = 2;
    pub const ACK: u8 = 3;
    pub const ERROR: u8 = 4;
}

/// Largest payload carried by one `Data` packet.
pub const MAX_PAYLOAD: usize = 512;

/// Bytes preceding the payload in a `Data` packet (type + seq).
pub const DATA_HEADER_LEN: usize = 2;

/// Largest datagram this protocol ever produces.
pub const MAX_DATAGRAM: usize = DATA_HEADER_LEN + MAX_PAYLOAD;

/// Width of the NUL-padded filename field in a `Request`.
pub const FILENAME_LEN: usize = 19;

/// Total size of an encoded `Request`.
pub const REQUEST_LEN: usize = 2 + FILENAME_LEN;

/// Bytes in an encoded `Ack`.
pub const ACK_LEN: usize = 2;

/// Bytes in an encoded `Error`.
pub const ERROR_LEN: usize = 1;

/// Smallest window a client may request.
pub const MIN_WINDOW: u8 = 1;

/// Largest window a client may request.
pub const MAX_WINDOW: u8 = 9;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Client asks the server for `filename` using a window of `window_size`.
    Request { window_size: u8, filename: String },
    /// One chunk of the file.
    Data { seq: u8, payload: Vec<u8> },
    /// Cumulative acknowledgement of every chunk up to and including `seq`.
    Ack { seq: u8 },
    /// Terminates the session.
    Error,
}

impl Packet {
    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Encoding never fails.  A filename longer than [`FILENAME_LEN`] bytes
    /// is truncated and a payload longer than [`MAX_PAYLOAD`] is written as
    /// is; validating both is the caller's job.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Request {
                window_size,
                filename,
            } => {
                let mut buf = vec![0u8; REQUEST_LEN];
                buf[0] = kind::REQUEST;
                buf[1] = *window_size;
                let name = filename.as_bytes();
                let n = name.len().min(FILENAME_LEN);
                buf[2..2 + n].copy_from_slice(&name[..n]);
                buf
            }
            Packet::Data { seq, payload } => encode_data(*seq, payload),
            Packet::Ack { seq } => vec![kind::ACK, *seq],
            Packet::Error => vec![kind::ERROR],
        }
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is empty or shorter than the fixed layout of its type,
    /// - the type byte is not one of [`kind`], or
    /// - a `Data` payload exceeds [`MAX_PAYLOAD`].
    ///
    /// Bytes beyond the fixed `Request`, `Ack` and `Error` layouts are
    /// ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let Some(&ty) = buf.first() else {
            return Err(PacketError::BufferTooShort { kind: 0, len: 0 });
        };
        let need = match ty {
            kind::REQUEST => REQUEST_LEN,
            kind::DATA => DATA_HEADER_LEN,
            kind::ACK => ACK_LEN,
            kind::ERROR => ERROR_LEN,
            other => return Err(PacketError::UnknownType(other)),
        };
        if buf.len() < need {
            return Err(PacketError::BufferTooShort {
                kind: ty,
                len: buf.len(),
            });
        }

        let packet = match ty {
            kind::REQUEST => {
                let field = &buf[2..REQUEST_LEN];
                let end = field.iter().position(|&b| b == 0).unwrap_or(FILENAME_LEN);
                Packet::Request {
                    window_size: buf[1],
                    filename: String::from_utf8_lossy(&field[..end]).into_owned(),
                }
            }
            kind::DATA => {
                let payload = &buf[DATA_HEADER_LEN..];
                if payload.len() > MAX_PAYLOAD {
                    return Err(PacketError::PayloadTooLarge(payload.len()));
                }
                Packet::Data {
                    seq: buf[1],
                    payload: payload.to_vec(),
                }
            }
            kind::ACK => Packet::Ack { seq: buf[1] },
            _ => Packet::Error,
        };
        Ok(packet)
    }

    /// Short human-readable name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Request { .. } => "REQUEST",
            Packet::Data { .. } => "DATA",
            Packet::Ack { .. } => "ACK",
            Packet::Error => "ERROR",
        }
    }
}

/// Errors that can arise when parsing a raw datagram.
///
/// All of these are treated as a malformed packet: the datagram is dropped
/// without a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Buffer shorter than the fixed layout of its declared type.
    #[error("datagram of type {kind} is too short ({len} bytes)")]
    BufferTooShort { kind: u8, len: usize },
    /// First byte is not a known message type.
    #[error("unknown message type {0}")]
    UnknownType(u8),
    /// `Data` payload larger than [`MAX_PAYLOAD`].
    #[error("data payload of {0} bytes exceeds 512")]
    PayloadTooLarge(usize),
}

/// Encode a `Data` packet straight from a borrowed payload.
pub fn encode_data(seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_HEADER_LEN + payload.len());
    buf.push(kind::DATA);
    buf.push(seq);
    buf.extend_from_slice(payload);
    buf
}

/// `true` when `window_size` lies in `MIN_WINDOW..=MAX_WINDOW`.
pub fn valid_window(window_size: u8) -> bool {
    (MIN_WINDOW..=MAX_WINDOW).contains(&window_size)
}
