//! File server: admits one `Request` at a time and runs the sender engine.
//!
//! The server owns a single transport.  Between sessions it blocks waiting
//! for a `Request`; during a session every datagram is routed through
//! [`PinnedSession`], which hands the engine only the served peer's traffic
//! and answers any other peer's `Request` with an `Error` packet.
//!
//! Session failures (missing file, retry exhaustion, transport errors while
//! talking to the client) are logged and the server goes back to waiting.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;

use crate::error::{Result, TransferError};
use crate::packet::{valid_window, Packet};
use crate::socket::{Socket, SocketError, Transport};
use crate::state::SessionState;
use crate::timer::TimerConfig;
use crate::transfer::{send_file, TransferReport};

/// Directory files are served from when none is configured.
pub const DEFAULT_ROOT: &str = "source_files";

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Directory requested names are resolved against.
    pub root: PathBuf,
    pub timer: TimerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9000)),
            root: PathBuf::from(DEFAULT_ROOT),
            timer: TimerConfig::default(),
        }
    }
}

/// What one call to [`Server::serve_one`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    /// A file was delivered and fully acknowledged.
    Completed {
        peer: SocketAddr,
        filename: String,
        report: TransferReport,
    },
    /// The datagram was not a `Request` and was dropped.
    Ignored,
}

/// A single-session file server over any [`Transport`].
pub struct Server<T> {
    transport: T,
    root: PathBuf,
    timer: TimerConfig,
    state: SessionState,
}

impl Server<Socket> {
    /// Bind a UDP socket and prepare to serve `config.root`.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let socket = Socket::bind(config.bind).await?;
        log::info!(
            "serving {} on {}",
            config.root.display(),
            socket.local_addr
        );
        Self::new(socket, &config.root, config.timer).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr
    }
}

impl<T: Transport> Server<T> {
    /// Wrap an existing transport.  `root` must exist.
    pub async fn new(transport: T, root: impl AsRef<Path>, timer: TimerConfig) -> Result<Self> {
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        Ok(Self {
            transport,
            root,
            timer,
            state: SessionState::Idle,
        })
    }

    /// Current admission state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve requests forever.
    ///
    /// Session failures are logged and do not stop the loop.  Returns only
    /// if the transport itself goes away.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.serve_one().await {
                Ok(Served::Completed {
                    peer,
                    filename,
                    report,
                }) => log::info!(
                    "sent {filename} to {peer}: {} bytes in {} chunks ({} resent, {} timeouts)",
                    report.bytes,
                    report.chunks,
                    report.retransmissions,
                    report.timeouts
                ),
                Ok(Served::Ignored) => {}
                Err(TransferError::Transport(SocketError::Closed)) => {
                    return Err(TransferError::Transport(SocketError::Closed));
                }
                Err(e) => log::warn!("session failed: {e}"),
            }
        }
    }

    /// Wait for one datagram and, if it is a `Request`, run its session to
    /// completion.
    pub async fn serve_one(&mut self) -> Result<Served> {
        let (bytes, from) = self.transport.recv_from().await?;
        match Packet::decode(&bytes) {
            Ok(Packet::Request {
                window_size,
                filename,
            }) => self.handle_request(from, window_size, filename).await,
            Ok(other) => {
                log::warn!("unexpected {} from {from} while idle; dropped", other.name());
                Ok(Served::Ignored)
            }
            Err(e) => {
                log::debug!("malformed datagram from {from}: {e}");
                Ok(Served::Ignored)
            }
        }
    }

    async fn handle_request(
        &mut self,
        peer: SocketAddr,
        window_size: u8,
        filename: String,
    ) -> Result<Served> {
        self.state.begin(peer);
        log::info!("request from {peer}: {filename:?} window={window_size}");

        let result = self.run_session(peer, window_size, &filename).await;
        self.state.release();
        result.map(|report| Served::Completed {
            peer,
            filename,
            report,
        })
    }

    async fn run_session(
        &mut self,
        peer: SocketAddr,
        window_size: u8,
        filename: &str,
    ) -> Result<TransferReport> {
        let opened = if valid_window(window_size) {
            open_source(&self.root, filename).await
        } else {
            Err(TransferError::InvalidWindow(window_size))
        };
        let mut file = match opened {
            Ok(file) => file,
            Err(e) => {
                log::warn!("refusing {filename:?} for {peer}: {e}");
                self.transport.send_to(&Packet::Error.encode(), peer).await?;
                return Err(e);
            }
        };

        let mut session = PinnedSession {
            inner: &mut self.transport,
            state: self.state,
        };
        send_file(&mut session, peer, &mut file, window_size, &self.timer).await
    }
}

/// Open `name` under `root`, refusing anything that is not a plain relative
/// path to a regular file inside `root`.
///
/// `root` must already be canonical.
pub async fn open_source(root: &Path, name: &str) -> Result<File> {
    let path = resolve(root, name).await?;
    File::open(&path)
        .await
        .map_err(|_| TransferError::FileNotFound(name.to_string()))
}

async fn resolve(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let plain = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(TransferError::InvalidFilename(name.to_string()));
    }

    let canonical = tokio::fs::canonicalize(root.join(relative))
        .await
        .map_err(|_| TransferError::FileNotFound(name.to_string()))?;
    // Symlinks may still point outside the root.
    if !canonical.starts_with(root) {
        return Err(TransferError::InvalidFilename(name.to_string()));
    }
    let meta = tokio::fs::metadata(&canonical)
        .await
        .map_err(|_| TransferError::FileNotFound(name.to_string()))?;
    if !meta.is_file() {
        return Err(TransferError::FileNotFound(name.to_string()));
    }
    Ok(canonical)
}

// ---------------------------------------------------------------------------
// PinnedSession
// ---------------------------------------------------------------------------

/// The server's transport as seen by a running session.
///
/// Only datagrams from the peer `state` is serving reach the engine.  A
/// `Request` from anyone else is answered with `Error`; all other strangers'
/// datagrams vanish.  Failing to reach a stranger never ends the session.
struct PinnedSession<'a, T> {
    inner: &'a mut T,
    state: SessionState,
}

impl<T: Transport> Transport for PinnedSession<'_, T> {
    async fn send_to(
        &mut self,
        bytes: &[u8],
        peer: SocketAddr,
    ) -> std::result::Result<(), SocketError> {
        self.inner.send_to(bytes, peer).await
    }

    async fn recv_from(&mut self) -> std::result::Result<(Vec<u8>, SocketAddr), SocketError> {
        loop {
            let (bytes, from) = self.inner.recv_from().await?;
            if self.state.is_serving(from) {
                return Ok((bytes, from));
            }
            if let Ok(Packet::Request { filename, .. }) = Packet::decode(&bytes) {
                log::warn!("rejecting request for {filename:?} from {from}: {}", self.state);
                if let Err(e) = self.inner.send_to(&Packet::Error.encode(), from).await {
                    log::warn!("could not send rejection to {from}: {e}");
                }
            } else {
                log::debug!("dropping datagram from {from} during session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scratch_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gbn-ftp-srv-{}", rand::random::<u64>()));
        tokio::fs::create_dir_all(dir.join("sub")).await.unwrap();
        tokio::fs::write(dir.join("hello.txt"), b"hello").await.unwrap();
        tokio::fs::write(dir.join("sub/inner.txt"), b"inner").await.unwrap();
        tokio::fs::canonicalize(dir).await.unwrap()
    }

    #[tokio::test]
    async fn resolves_plain_names() {
        let root = scratch_root().await;
        assert_eq!(
            resolve(&root, "hello.txt").await.unwrap(),
            root.join("hello.txt")
        );
        assert_eq!(
            resolve(&root, "sub/inner.txt").await.unwrap(),
            root.join("sub/inner.txt")
        );
        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_traversal_and_absolute_names() {
        let root = scratch_root().await;
        for bad in ["../etc/passwd", "sub/../../x", "/etc/passwd", "", "./hello.txt"] {
            let err = resolve(&root, bad).await.unwrap_err();
            assert!(
                matches!(err, TransferError::InvalidFilename(_)),
                "{bad:?} gave {err:?}"
            );
        }
        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_and_directories_are_not_found() {
        let root = scratch_root().await;
        for name in ["nope.txt", "sub"] {
            let err = resolve(&root, name).await.unwrap_err();
            assert!(matches!(err, TransferError::FileNotFound(_)), "{name:?}");
        }
        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
