//! p2plocate node entry point.
//!
//! Runs a single discovery node: it announces itself on the local network,
//! records every peer that answers, and prints the known devices each time a
//! burst of new peers settles.
//!
//! # Usage
//!
//! ```text
//! p2plocate [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file [default: platform config dir]
//!   --port <PORT>            Discovery UDP port [default: 20400]
//!   -f, --function <NAME>    Advertised function (repeatable)
//!   --client-id <ID>         Fixed client id instead of the identity file
//!   --broadcast <ADDR>       Discover destination instead of auto-detection
//!   --identity-file <PATH>   Where the generated client id is kept
//!   --log-level <LEVEL>      Log level when RUST_LOG is unset
//! ```
//!
//! Flags take precedence over the config file.  Each flag can also be set
//! through the environment variable listed in `--help`.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use p2plocate::infrastructure::identity::FileIdentityProvider;
use p2plocate::infrastructure::network::interfaces::SystemNetworkInfo;
use p2plocate::infrastructure::storage::config::{load_config, load_config_from, NodeConfig};
use p2plocate::DiscoveryServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Finds peers on the local network over UDP broadcast.
#[derive(Debug, Parser)]
#[command(
    name = "p2plocate",
    about = "Local-network peer discovery over UDP broadcast",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "P2PLOCATE_CONFIG")]
    config: Option<PathBuf>,

    /// UDP port to listen on and send Discover messages to.
    #[arg(long, env = "P2PLOCATE_PORT")]
    port: Option<u16>,

    /// Function this node advertises.  Repeat for several.
    #[arg(short = 'f', long = "function", value_name = "NAME")]
    functions: Vec<String>,

    /// Fixed client id.
    #[arg(long, env = "P2PLOCATE_CLIENT_ID")]
    client_id: Option<String>,

    /// Destination address for Discover messages.
    #[arg(long, env = "P2PLOCATE_BROADCAST")]
    broadcast: Option<Ipv4Addr>,

    /// File the generated client id is persisted to.
    #[arg(long, env = "P2PLOCATE_IDENTITY_FILE")]
    identity_file: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "P2PLOCATE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Overlays every flag that was given onto `config`.
    fn apply_to(self, config: &mut NodeConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if !self.functions.is_empty() {
            config.node.functions = self.functions;
        }
        if let Some(id) = self.client_id {
            config.node.client_id = Some(id);
        }
        if let Some(addr) = self.broadcast {
            config.network.broadcast_address = Some(addr);
        }
        if let Some(path) = self.identity_file {
            config.node.identity_file = path;
        }
        if let Some(level) = self.log_level {
            config.node.log_level = level;
        }
    }
}

fn log_devices(server: &DiscoveryServer) {
    let devices = server.devices();
    info!("{} device(s) known", devices.len());
    for device in devices {
        info!(
            "  {} at {} offering [{}]",
            device.peer_id,
            device.address,
            device.functions.join(", ")
        );
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => load_config_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };
    cli.apply_to(&mut config);

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    let server = DiscoveryServer::with_providers(
        config.server_config(),
        Arc::new(FileIdentityProvider::new(config.node.identity_file.clone())),
        Arc::new(SystemNetworkInfo),
    );

    let (settled_tx, mut settled_rx) = mpsc::unbounded_channel();
    server.on_discover(move || {
        let _ = settled_tx.send(());
    });

    server
        .start()
        .await
        .with_context(|| format!("failed to start discovery on UDP port {}", server.port()))?;
    info!(
        "p2plocate node {} ready.  Press Ctrl-C to exit.",
        server.client_id().unwrap_or_default()
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("shutdown signal received");
                break;
            }
            Some(()) = settled_rx.recv() => log_devices(&server),
        }
    }

    server.stop().await;
    info!("p2plocate node stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
