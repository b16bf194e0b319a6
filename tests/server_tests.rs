//! Server and client end to end: file lookup, admission and loopback UDP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gbn_ftp::client::{self, ClientConfig};
use gbn_ftp::packet::Packet;
use gbn_ftp::server::{Served, Server, ServerConfig};
use gbn_ftp::simulator::{local, AckLoss, MemoryNetwork};
use gbn_ftp::socket::{SocketError, Transport};
use gbn_ftp::state::SessionState;
use gbn_ftp::timer::TimerConfig;
use gbn_ftp::{receive_file, TransferError};

/// A fresh directory under the system temp dir holding `big.bin`.
async fn scratch_root(len: usize) -> (PathBuf, Vec<u8>) {
    let dir = std::env::temp_dir().join(format!("gbn-ftp-it-{}", rand::random::<u64>()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let content: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
    tokio::fs::write(dir.join("big.bin"), &content).await.unwrap();
    (dir, content)
}

fn request(window_size: u8, filename: &str) -> Vec<u8> {
    Packet::Request {
        window_size,
        filename: filename.to_string(),
    }
    .encode()
}

async fn expect_error_reply<T: Transport>(t: &mut T, server: SocketAddr) {
    let (bytes, from) = tokio::time::timeout(Duration::from_secs(5), t.recv_from())
        .await
        .expect("no reply")
        .unwrap();
    assert_eq!(from, server);
    assert_eq!(Packet::decode(&bytes).unwrap(), Packet::Error);
}

async fn cleanup(dir: &Path) {
    let _ = tokio::fs::remove_dir_all(dir).await;
}

// ---------------------------------------------------------------------------
// Loopback UDP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_over_loopback_udp() {
    let (root, content) = scratch_root(3 * 512 + 77).await;
    let config = ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        root: root.clone(),
        timer: TimerConfig::default(),
    };
    let mut server = Server::bind(&config).await.unwrap();
    let server_addr = server.local_addr();
    let serving = tokio::spawn(async move { server.serve_one().await });

    let mut client_cfg = ClientConfig::new(server_addr, "big.bin", 3);
    client_cfg.output = root.join("copy.bin");
    let report = client::fetch(&client_cfg).await.expect("fetch failed");

    assert_eq!(report.bytes, content.len() as u64);
    assert_eq!(report.chunks, 4);
    assert_eq!(tokio::fs::read(&client_cfg.output).await.unwrap(), content);

    match serving.await.unwrap().unwrap() {
        Served::Completed { filename, report, .. } => {
            assert_eq!(filename, "big.bin");
            assert_eq!(report.bytes, content.len() as u64);
        }
        other => panic!("unexpected {other:?}"),
    }
    cleanup(&root).await;
}

#[tokio::test]
async fn missing_file_gets_error_and_no_output() {
    let (root, _) = scratch_root(10).await;
    let config = ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        root: root.clone(),
        timer: TimerConfig::default(),
    };
    let mut server = Server::bind(&config).await.unwrap();
    let server_addr = server.local_addr();
    let serving = tokio::spawn(async move { server.serve_one().await });

    let mut client_cfg = ClientConfig::new(server_addr, "absent.txt", 1);
    client_cfg.output = root.join("absent.out");
    let err = client::fetch(&client_cfg).await.unwrap_err();

    assert!(matches!(err, TransferError::RemoteError), "{err:?}");
    assert!(!client_cfg.output.exists(), "partial output left behind");
    let served = serving.await.unwrap();
    assert!(matches!(served, Err(TransferError::FileNotFound(ref n)) if n == "absent.txt"));
    cleanup(&root).await;
}

// ---------------------------------------------------------------------------
// In-memory network
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_client_is_refused_while_busy() {
    let (root, content) = scratch_root(4 * 512 + 3).await;
    let net = MemoryNetwork::new();
    let server_addr = local(1);
    let mut server = Server::new(net.endpoint(server_addr), &root, TimerConfig::default())
        .await
        .unwrap();
    let mut a = net.endpoint(local(2));
    let mut b = net.endpoint(local(3));

    // Both requests are queued before the server looks: A is admitted first,
    // B's request then arrives mid-session.
    a.send_to(&request(2, "big.bin"), server_addr).await.unwrap();
    b.send_to(&request(2, "big.bin"), server_addr).await.unwrap();

    let serving = tokio::spawn(async move {
        let served = server.serve_one().await;
        (served, server)
    });

    expect_error_reply(&mut b, server_addr).await;

    let mut sink = Vec::new();
    receive_file(&mut a, server_addr, &mut sink, &TimerConfig::default(), AckLoss::default())
        .await
        .expect("admitted client failed");
    assert_eq!(sink, content);

    let (served, server) = serving.await.unwrap();
    match served.unwrap() {
        Served::Completed { peer, .. } => assert_eq!(peer, local(2)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(server.state(), SessionState::Idle);
    cleanup(&root).await;
}

#[tokio::test]
async fn invalid_window_is_refused() {
    let (root, _) = scratch_root(10).await;
    let net = MemoryNetwork::new();
    let server_addr = local(1);
    let mut server = Server::new(net.endpoint(server_addr), &root, TimerConfig::default())
        .await
        .unwrap();
    let mut client = net.endpoint(local(2));

    for window in [0u8, 10] {
        client.send_to(&request(window, "big.bin"), server_addr).await.unwrap();
        let err = server.serve_one().await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidWindow(w) if w == window));
        expect_error_reply(&mut client, server_addr).await;
        assert_eq!(server.state(), SessionState::Idle);
    }
    cleanup(&root).await;
}

#[tokio::test]
async fn traversal_is_refused() {
    let (root, _) = scratch_root(10).await;
    let net = MemoryNetwork::new();
    let server_addr = local(1);
    let mut server = Server::new(net.endpoint(server_addr), &root, TimerConfig::default())
        .await
        .unwrap();
    let mut client = net.endpoint(local(2));

    client.send_to(&request(1, "../big.bin"), server_addr).await.unwrap();
    let err = server.serve_one().await.unwrap_err();
    assert!(matches!(err, TransferError::InvalidFilename(_)), "{err:?}");
    expect_error_reply(&mut client, server_addr).await;
    cleanup(&root).await;
}

#[tokio::test]
async fn idle_server_ignores_non_requests() {
    let (root, _) = scratch_root(10).await;
    let net = MemoryNetwork::new();
    let server_addr = local(1);
    let mut server = Server::new(net.endpoint(server_addr), &root, TimerConfig::default())
        .await
        .unwrap();
    let mut client = net.endpoint(local(2));

    client.send_to(&Packet::Ack { seq: 3 }.encode(), server_addr).await.unwrap();
    client.send_to(&[0xff, 1, 2], server_addr).await.unwrap();
    assert_eq!(server.serve_one().await.unwrap(), Served::Ignored);
    assert_eq!(server.serve_one().await.unwrap(), Served::Ignored);
    assert_eq!(server.state(), SessionState::Idle);
    cleanup(&root).await;
}

#[tokio::test]
async fn fetch_with_memory_transport_writes_output() {
    let (root, content) = scratch_root(700).await;
    let net = MemoryNetwork::new();
    let server_addr = local(1);
    let mut server = Server::new(net.endpoint(server_addr), &root, TimerConfig::default())
        .await
        .unwrap();
    let mut client_end = net.endpoint(local(2));
    let serving = tokio::spawn(async move { server.serve_one().await });

    let mut cfg = ClientConfig::new(server_addr, "big.bin", 9);
    cfg.output = root.join("mem.out");
    let report = client::fetch_with(&mut client_end, &cfg).await.unwrap();

    assert_eq!(report.chunks, 2);
    assert_eq!(tokio::fs::read(&cfg.output).await.unwrap(), content);
    assert!(matches!(serving.await.unwrap(), Ok(Served::Completed { .. })));
    cleanup(&root).await;
}

/// Fails every send to `blocked`, as for an unroutable address.
struct Unroutable<T> {
    inner: T,
    blocked: SocketAddr,
}

impl<T: Transport> Transport for Unroutable<T> {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), SocketError> {
        if peer == self.blocked {
            let e = std::io::Error::new(std::io::ErrorKind::Other, "no route to host");
            return Err(e.into());
        }
        self.inner.send_to(bytes, peer).await
    }

    async fn recv_from(&mut self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        self.inner.recv_from().await
    }
}

#[tokio::test]
async fn unreachable_rejected_client_does_not_end_session() {
    let (root, content) = scratch_root(4 * 512 + 3).await;
    let net = MemoryNetwork::new();
    let server_addr = local(1);
    let transport = Unroutable {
        inner: net.endpoint(server_addr),
        blocked: local(3),
    };
    let mut server = Server::new(transport, &root, TimerConfig::default())
        .await
        .unwrap();
    let mut a = net.endpoint(local(2));
    let mut b = net.endpoint(local(3));

    a.send_to(&request(2, "big.bin"), server_addr).await.unwrap();
    b.send_to(&request(2, "big.bin"), server_addr).await.unwrap();
    let serving = tokio::spawn(async move { server.serve_one().await });

    let mut sink = Vec::new();
    receive_file(&mut a, server_addr, &mut sink, &TimerConfig::default(), AckLoss::default())
        .await
        .expect("admitted client failed");
    assert_eq!(sink, content);
    match serving.await.unwrap() {
        Ok(Served::Completed { peer, .. }) => assert_eq!(peer, local(2)),
        other => panic!("unexpected {other:?}"),
    }
    cleanup(&root).await;
}
