use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    process::ExitCode,
    time::Duration,
};

use clap::Parser;
use kadlink::{message::Protocol, tcp::Node, Config};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs a peer of the overlay until interrupted.
#[derive(Debug, Parser)]
#[command(name = "kadlink", version)]
struct Args {
    /// The name advertised to other peers.
    #[arg(short = 'n', long)]
    name: String,

    /// A peer to join the overlay through.
    #[arg(short = 'p', long, value_name = "IP:PORT")]
    peer: Option<SocketAddr>,

    /// The IP to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    ip: IpAddr,

    /// The IP advertised to peers, defaults to the listening IP.
    #[arg(long)]
    advertise_ip: Option<IpAddr>,

    /// The port to listen on, random if omitted.
    #[arg(long)]
    port: Option<u16>,

    /// The period between two rounds of heartbeats.
    #[arg(long, default_value_t = 5000, value_name = "MS")]
    interval_ms: u64,

    /// The time a heartbeat may take before it counts as missed.
    #[arg(long, default_value_t = 2000, value_name = "MS")]
    probe_timeout_ms: u64,

    /// The protocol version stamped on outgoing messages.
    #[arg(long, default_value_t = Protocol::DEFAULT_VERSION)]
    protocol_version: u32,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            listener_ip: self.ip,
            advertised_ip: self.advertise_ip,
            listener_port: self.port,
            protocol_version: self.protocol_version,
            heartbeat_interval: Duration::from_millis(self.interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let node = match Node::bind(args.name.clone(), args.config()).await {
        Ok(node) => node,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let handle = match node.start() {
        Ok(handle) => handle,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(peer) = args.peer {
        // Failures are logged, the node keeps running on its own.
        let _ = node.bootstrap(peer).await;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }

    info!("shutting down");
    handle.shutdown();

    ExitCode::SUCCESS
}
