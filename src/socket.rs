//! Datagram transport abstraction.
//!
//! The engines in [`crate::transfer`] never touch a socket directly; they
//! speak to a [`Transport`], which moves raw datagrams to and from a peer
//! address and can wait for the next datagram until a deadline.
//!
//! [`Socket`] is the production implementation: a thin wrapper around
//! `tokio::net::UdpSocket`.  [`crate::simulator`] provides in-memory and
//! fault-injecting implementations for tests.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::packet::MAX_DATAGRAM;

// Receive buffer; one byte larger than any valid datagram so an oversized
// one is reported as such instead of being silently truncated to fit.
const RECV_BUF: usize = MAX_DATAGRAM + 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The other end of an in-memory transport has gone away.
    #[error("transport closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Outcome of waiting for a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    /// A datagram arrived from `from`.
    Datagram(Vec<u8>, SocketAddr),
    /// The deadline passed with nothing received.
    Timeout,
}

/// Single-socket, connectionless datagram I/O.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one datagram to `peer`.
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), SocketError>;

    /// Wait (without bound) for the next datagram.
    async fn recv_from(&mut self) -> Result<(Vec<u8>, SocketAddr), SocketError>;

    /// Wait for the next datagram, giving up at `deadline`.
    async fn recv_until(&mut self, deadline: Instant) -> Result<Recv, SocketError> {
        match tokio::time::timeout_at(deadline, self.recv_from()).await {
            Ok(result) => result.map(|(bytes, from)| Recv::Datagram(bytes, from)),
            Err(_elapsed) => Ok(Recv::Timeout),
        }
    }
}

impl<T: Transport> Transport for &mut T {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), SocketError> {
        (**self).send_to(bytes, peer).await
    }

    async fn recv_from(&mut self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        (**self).recv_from().await
    }

    async fn recv_until(&mut self, deadline: Instant) -> Result<Recv, SocketError> {
        (**self).recv_until(deadline).await
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// A UDP socket speaking raw protocol datagrams.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Transport for Socket {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, peer).await?;
        Ok(())
    }

    async fn recv_from(&mut self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; RECV_BUF];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind failed")
    }

    #[tokio::test]
    async fn datagram_crosses_loopback() {
        let mut a = loopback().await;
        let mut b = loopback().await;

        a.send_to(&[3, 1], b.local_addr).await.unwrap();
        let (bytes, from) = b.recv_from().await.unwrap();
        assert_eq!(bytes, [3, 1]);
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn recv_until_reports_timeout() {
        let mut a = loopback().await;
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(a.recv_until(deadline).await.unwrap(), Recv::Timeout);
    }
}
