//! `gbn-ftp` — one-directional file transfer over UDP using Go-Back-N.
//!
//! # Architecture
//!
//! ```text
//!   client                                    server
//!  ┌──────────────┐   REQUEST{window, name}  ┌──────────────┐
//!  │ receive_file │─────────────────────────▶│   Server     │
//!  │ (GbnReceiver)│                          │ (admission)  │
//!  │              │◀───── DATA seq/payload ──│  send_file   │
//!  │              │────── ACK seq ──────────▶│ (GbnSender)  │
//!  └──────┬───────┘                          └──────┬───────┘
//!         │ raw datagrams                           │
//!  ┌──────▼──────────────────────────────────────────▼──────┐
//!  │      Transport  (UDP Socket, or in-memory Simulator)   │
//!  └────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]        — wire format of the four messages
//! - [`socket`]        — `Transport` trait and the tokio UDP socket
//! - [`timer`]         — ACK timeout and retry budget
//! - [`gbn_sender`]    — GBN send window state machine
//! - [`gbn_receiver`]  — in-order receive state machine
//! - [`transfer`]      — the async engines driving both state machines
//! - [`state`]         — server session-admission state
//! - [`server`]        — request handling, safe file lookup, session loop
//! - [`client`]        — request a file and write it to disk
//! - [`simulator`]     — in-memory network and fault injection for testing
//! - [`error`]         — session error taxonomy

pub mod client;
pub mod error;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod transfer;

pub use error::{Result, TransferError};
pub use packet::{Packet, PacketError};
pub use transfer::{receive_file, send_file, TransferReport};
