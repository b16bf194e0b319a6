//! File client: requests one file and receives it into a local path.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::fs::File;

use crate::error::{Result, TransferError};
use crate::packet::{valid_window, Packet, FILENAME_LEN};
use crate::simulator::AckLoss;
use crate::socket::{Socket, Transport};
use crate::timer::TimerConfig;
use crate::transfer::{receive_file, TransferReport};

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (already resolved).
    pub server: SocketAddr,
    /// Name to request; at most 19 bytes.
    pub filename: String,
    /// Go-Back-N window the server should use, 1..=9.
    pub window_size: u8,
    /// Where the received bytes are written.
    pub output: PathBuf,
    /// Sequence numbers whose ACK is lost once per listing.
    pub lose_acks: Vec<u8>,
    pub timer: TimerConfig,
}

impl ClientConfig {
    pub fn new(server: SocketAddr, filename: impl Into<String>, window_size: u8) -> Self {
        let filename = filename.into();
        Self {
            server,
            output: PathBuf::from(&filename),
            filename,
            window_size,
            lose_acks: Vec::new(),
            timer: TimerConfig::default(),
        }
    }

    /// Reject settings the wire format cannot carry.
    pub fn validate(&self) -> Result<()> {
        if !valid_window(self.window_size) {
            return Err(TransferError::InvalidWindow(self.window_size));
        }
        if self.filename.is_empty() || self.filename.len() > FILENAME_LEN {
            return Err(TransferError::InvalidFilename(self.filename.clone()));
        }
        Ok(())
    }
}

/// Fetch `config.filename` over a fresh UDP socket.
pub async fn fetch(config: &ClientConfig) -> Result<TransferReport> {
    let any: SocketAddr = if config.server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let mut socket = Socket::bind(any).await?;
    fetch_with(&mut socket, config).await
}

/// Fetch `config.filename` over an existing transport.
///
/// On any failure the partially written output file is removed.
pub async fn fetch_with<T: Transport>(
    transport: &mut T,
    config: &ClientConfig,
) -> Result<TransferReport> {
    config.validate()?;

    let mut output = File::create(&config.output).await?;
    let request = Packet::Request {
        window_size: config.window_size,
        filename: config.filename.clone(),
    };
    let result = match transport.send_to(&request.encode(), config.server).await {
        Ok(()) => {
            log::info!(
                "requested {:?} from {} (window {})",
                config.filename,
                config.server,
                config.window_size
            );
            receive_file(
                transport,
                config.server,
                &mut output,
                &config.timer,
                AckLoss::new(config.lose_acks.iter().copied()),
            )
            .await
        }
        Err(e) => Err(TransferError::from(e)),
    };
    drop(output);

    if let Err(e) = &result {
        log::warn!("transfer failed: {e}; removing {}", config.output.display());
        if let Err(rm) = tokio::fs::remove_file(&config.output).await {
            log::warn!("could not remove {}: {rm}", config.output.display());
        }
    }
    result
}
