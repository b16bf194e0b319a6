//! Network simulation for deterministic testing.
//!
//! Real networks drop packets.  To exercise the timeout and go-back paths
//! without depending on actual network conditions this module provides:
//!
//! | Piece               | Description                                          |
//! |---------------------|------------------------------------------------------|
//! | [`MemoryNetwork`]   | In-process datagram fabric; endpoints are addressed  |
//! |                     | by `SocketAddr` and talk over unbounded channels.    |
//! | [`Simulator`]       | Wraps any [`Transport`] and drops outbound datagrams |
//! |                     | by rule or at random, recording all traffic.         |
//! | [`AckLoss`]         | Receiver-side loss of chosen ACKs: the receiver acts |
//! |                     | as though the `Data` datagram never arrived.         |
//!
//! In-memory endpoints work with tokio's paused clock, so tests can sit
//! through several 3-second timeouts instantly.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::packet::Packet;
use crate::socket::{SocketError, Transport};

type Datagram = (Vec<u8>, SocketAddr);

// ---------------------------------------------------------------------------
// AckLoss
// ---------------------------------------------------------------------------

/// Sequence numbers whose ACK should be "lost", one entry per loss.
///
/// Listing a sequence twice loses its ACK twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckLoss {
    pending: Vec<u8>,
}

impl AckLoss {
    pub fn new(seqs: impl IntoIterator<Item = u8>) -> Self {
        Self {
            pending: seqs.into_iter().collect(),
        }
    }

    /// Consume one scheduled loss of `seq`.  Returns `true` if there was one.
    pub fn take(&mut self, seq: u8) -> bool {
        match self.pending.iter().position(|&s| s == seq) {
            Some(i) => {
                self.pending.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MemoryNetwork
// ---------------------------------------------------------------------------

/// A lossless in-process datagram network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    routes: Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `addr`, replacing any previous one.
    pub fn endpoint(&self, addr: SocketAddr) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(addr, tx);
        MemoryTransport {
            local_addr: addr,
            network: self.clone(),
            rx,
        }
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Two endpoints on a fresh [`MemoryNetwork`], at `127.0.0.1:1` and
/// `127.0.0.1:2`.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let net = MemoryNetwork::new();
    (net.endpoint(local(1)), net.endpoint(local(2)))
}

/// Loopback address with the given port, for naming in-memory endpoints.
pub fn local(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// One endpoint of a [`MemoryNetwork`].
///
/// Sending to an address with no endpoint silently drops the datagram, as
/// UDP would.
#[derive(Debug)]
pub struct MemoryTransport {
    local_addr: SocketAddr,
    network: MemoryNetwork,
    rx: mpsc::UnboundedReceiver<Datagram>,
}

impl MemoryTransport {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for MemoryTransport {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), SocketError> {
        if let Some(route) = self.network.lock().get(&peer) {
            let _ = route.send((bytes.to_vec(), self.local_addr));
        }
        Ok(())
    }

    async fn recv_from(&mut self) -> Result<Datagram, SocketError> {
        self.rx.recv().await.ok_or(SocketError::Closed)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.lock().remove(&self.local_addr);
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Configuration for the fault-injection model.
///
/// Rules apply to datagrams **sent** through the wrapped transport.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Probability in `[0.0, 1.0]` that any `Data` packet is dropped.
    pub data_loss_rate: f64,
    /// Drop the first transmission of `Data` with each listed seq.
    pub drop_data_once: Vec<u8>,
    /// Drop the first `Ack` with each listed seq.
    pub drop_acks_once: Vec<u8>,
    /// Seed for `data_loss_rate`, so failures are reproducible.
    pub seed: u64,
}

/// Everything a [`Simulator`] was asked to send.
#[derive(Debug, Clone, Default)]
pub struct Traffic {
    /// Packets passed on to the inner transport.
    pub delivered: Vec<Packet>,
    /// Packets swallowed by a fault rule.
    pub dropped: Vec<Packet>,
}

impl Traffic {
    /// Wire seqs of delivered `Data` packets, in send order.
    pub fn data_seqs(&self) -> Vec<u8> {
        self.delivered
            .iter()
            .filter_map(|p| match p {
                Packet::Data { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect()
    }

    /// Payload lengths of delivered `Data` packets, in send order.
    pub fn data_lens(&self) -> Vec<usize> {
        self.delivered
            .iter()
            .filter_map(|p| match p {
                Packet::Data { payload, .. } => Some(payload.len()),
                _ => None,
            })
            .collect()
    }

    /// Wire seqs of delivered `Ack` packets, in send order.
    pub fn ack_seqs(&self) -> Vec<u8> {
        self.delivered
            .iter()
            .filter_map(|p| match p {
                Packet::Ack { seq } => Some(*seq),
                _ => None,
            })
            .collect()
    }
}

/// A fault-injecting wrapper around a [`Transport`].
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    traffic: Arc<Mutex<Traffic>>,
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            traffic: Arc::default(),
        }
    }

    /// Shared view of the recorded traffic; stays valid after the simulator
    /// has moved into a task.
    pub fn traffic(&self) -> Arc<Mutex<Traffic>> {
        Arc::clone(&self.traffic)
    }

    fn should_drop(&mut self, packet: &Packet) -> bool {
        match packet {
            Packet::Data { seq, .. } => {
                if take_once(&mut self.config.drop_data_once, *seq) {
                    return true;
                }
                let p = self.config.data_loss_rate.clamp(0.0, 1.0);
                p > 0.0 && self.rng.gen_bool(p)
            }
            Packet::Ack { seq } => take_once(&mut self.config.drop_acks_once, *seq),
            _ => false,
        }
    }
}

fn take_once(list: &mut Vec<u8>, seq: u8) -> bool {
    match list.iter().position(|&s| s == seq) {
        Some(i) => {
            list.remove(i);
            true
        }
        None => false,
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), SocketError> {
        let Ok(packet) = Packet::decode(bytes) else {
            return self.inner.send_to(bytes, peer).await;
        };
        if self.should_drop(&packet) {
            log::debug!("[sim] dropping {} to {peer}", packet.name());
            lock(&self.traffic).dropped.push(packet);
            return Ok(());
        }
        lock(&self.traffic).delivered.push(packet);
        self.inner.send_to(bytes, peer).await
    }

    async fn recv_from(&mut self) -> Result<Datagram, SocketError> {
        self.inner.recv_from().await
    }
}

fn lock(traffic: &Mutex<Traffic>) -> std::sync::MutexGuard<'_, Traffic> {
    traffic.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::socket::Recv;

    #[test]
    fn ack_loss_consumes_entries() {
        let mut loss = AckLoss::new([0, 3, 3]);
        assert!(loss.take(3));
        assert!(loss.take(3));
        assert!(!loss.take(3));
        assert!(!loss.take(1));
        assert!(loss.take(0));
        assert!(loss.is_empty());
    }

    #[tokio::test]
    async fn memory_pair_delivers_with_source() {
        let (mut a, mut b) = memory_pair();
        a.send_to(b"hi", b.local_addr()).await.unwrap();
        let (bytes, from) = b.recv_from().await.unwrap();
        assert_eq!(bytes, b"hi");
        assert_eq!(from, a.local_addr());
    }

    #[tokio::test]
    async fn send_to_missing_endpoint_is_silent() {
        let (mut a, b) = memory_pair();
        let gone = b.local_addr();
        drop(b);
        a.send_to(b"lost", gone).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn recv_until_times_out_on_silence() {
        let (mut a, _b) = memory_pair();
        let deadline = Instant::now() + Duration::from_secs(3);
        assert_eq!(a.recv_until(deadline).await.unwrap(), Recv::Timeout);
    }

    #[tokio::test]
    async fn drop_once_rules_fire_once() {
        let (a, mut b) = memory_pair();
        let mut sim = Simulator::new(
            a,
            SimulatorConfig {
                drop_data_once: vec![1],
                drop_acks_once: vec![0],
                ..Default::default()
            },
        );
        let to = b.local_addr();
        let data = Packet::Data {
            seq: 1,
            payload: vec![9],
        }
        .encode();
        sim.send_to(&data, to).await.unwrap();
        sim.send_to(&data, to).await.unwrap();
        sim.send_to(&Packet::Ack { seq: 0 }.encode(), to).await.unwrap();
        sim.send_to(&Packet::Ack { seq: 0 }.encode(), to).await.unwrap();

        let traffic = sim.traffic();
        let t = traffic.lock().unwrap();
        assert_eq!(t.dropped.len(), 2);
        assert_eq!(t.data_seqs(), vec![1]);
        assert_eq!(t.ack_seqs(), vec![0]);

        let (first, _) = b.recv_from().await.unwrap();
        assert_eq!(first, data);
    }

    #[tokio::test]
    async fn full_loss_rate_drops_every_data_packet() {
        let (a, b) = memory_pair();
        let mut sim = Simulator::new(
            a,
            SimulatorConfig {
                data_loss_rate: 1.0,
                ..Default::default()
            },
        );
        for seq in 0..4 {
            let data = Packet::Data {
                seq,
                payload: vec![],
            };
            sim.send_to(&data.encode(), b.local_addr()).await.unwrap();
        }
        sim.send_to(&Packet::Ack { seq: 0 }.encode(), b.local_addr())
            .await
            .unwrap();

        let traffic = sim.traffic();
        let t = traffic.lock().unwrap();
        assert_eq!(t.dropped.len(), 4);
        assert_eq!(t.ack_seqs(), vec![0]);
    }
}
