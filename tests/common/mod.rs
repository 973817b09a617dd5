#![cfg(all(feature = "codec", feature = "sync"))]

use std::{net::SocketAddr, time::Duration};

use kadlink::{tcp::Node, Config, Id};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[allow(dead_code)]
pub fn enable_tracing() {
    fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// A configuration with an OS-assigned port, a fixed identifier and short timings.
pub fn config(id: u16) -> Config {
    Config {
        listener_port: Some(0),
        local_id: Some(Id::new(id)),
        heartbeat_interval: Duration::from_millis(100),
        probe_timeout: Duration::from_millis(500),
        session_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

pub async fn node(name: &str, id: u16) -> Node {
    Node::bind(name, config(id)).await.unwrap()
}

/// Returns an address nothing listens on.
#[allow(dead_code)]
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
