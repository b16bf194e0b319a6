//! Entry point for `gbn-ftp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, name resolution).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gbn_ftp::client::{self, ClientConfig};
use gbn_ftp::server::{Server, ServerConfig, DEFAULT_ROOT};
use gbn_ftp::timer::TimerConfig;

/// Reliable file transfer over UDP (Go-Back-N).
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files from a directory, one client at a time.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: String,
        /// Directory requested names are resolved against.
        #[arg(short, long, default_value = DEFAULT_ROOT)]
        root: PathBuf,
    },
    /// Download one file from a server.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: String,
        /// Go-Back-N window size the server should use (1-9).
        #[arg(short, long, default_value_t = 1)]
        window: u8,
        /// Where to write the file (defaults to the requested name).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated sequence numbers whose ACK is lost once each.
        #[arg(long, value_delimiter = ',')]
        lose_acks: Vec<u8>,
        /// Give up after this many seconds without hearing from the server.
        #[arg(long, default_value_t = 30)]
        idle_timeout_secs: u64,
        /// File to request (at most 19 bytes).
        filename: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { bind, root } => {
            let config = ServerConfig {
                bind: resolve(&bind).await?,
                root,
                timer: TimerConfig::default(),
            };
            let mut server = Server::bind(&config)
                .await
                .with_context(|| format!("cannot start server on {bind}"))?;
            server.run().await?;
        }
        Mode::Client {
            server,
            window,
            output,
            lose_acks,
            idle_timeout_secs,
            filename,
        } => {
            let mut config = ClientConfig::new(resolve(&server).await?, filename, window);
            if let Some(output) = output {
                config.output = output;
            }
            config.lose_acks = lose_acks;
            config.timer.idle_timeout = Duration::from_secs(idle_timeout_secs);

            let report = client::fetch(&config)
                .await
                .with_context(|| format!("fetching {:?} from {server}", config.filename))?;
            log::info!(
                "received {} bytes in {} chunks into {}",
                report.bytes,
                report.chunks,
                config.output.display()
            );
        }
    }
    Ok(())
}

/// Resolve `host:port` to the first matching socket address.
async fn resolve(addr: &str) -> anyhow::Result<std::net::SocketAddr> {
    let mut addrs = tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("cannot resolve {addr}"))?;
    match addrs.next() {
        Some(a) => Ok(a),
        None => bail!("{addr} resolved to no addresses"),
    }
}
