use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle, time::error::Elapsed};
use tracing::{info, warn, Instrument};

use crate::{
    codec::CodecError,
    config::Config,
    core::{
        identity::{generate_id, random_port},
        message::Protocol,
        peer::PeerRecord,
    },
    tcp::{liveness::Liveness, sync::SyncRoutingTable},
};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to bind the listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("{0} can't be advertised to peers, set an advertised address")]
    Unadvertisable(IpAddr),
    #[error("the node has already been started")]
    AlreadyStarted,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("timed out")]
    Timeout(#[from] Elapsed),
    #[error("connection closed before a reply was received")]
    Closed,
}

/// A peer in the overlay.
///
/// The node owns the routing table shared by every task it spawns. It is cheap to clone, all
/// clones refer to the same table.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) local: PeerRecord,
    pub(crate) routing_table: SyncRoutingTable,
    pub(crate) protocol: Protocol,
    pub(crate) config: Config,
    listening_addr: SocketAddr,
    // Taken by the accept loop once the node is started.
    listener: Arc<Mutex<Option<TcpListener>>>,
}

impl Node {
    /// Binds the listener and derives the node's identity from the advertised address. A failure to
    /// bind is the only fatal error a node can run into.
    pub async fn bind(name: impl Into<String>, config: Config) -> Result<Self, NodeError> {
        let advertised_ip = config.advertised_ip.unwrap_or(config.listener_ip);
        if advertised_ip.is_unspecified() {
            return Err(NodeError::Unadvertisable(advertised_ip));
        }

        let port = config.listener_port.unwrap_or_else(random_port);
        let addr = SocketAddr::new(config.listener_ip, port);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        let listening_addr = listener.local_addr()?;

        let address = advertised_ip.to_string();
        let id = config
            .local_id
            .unwrap_or_else(|| generate_id(&address, listening_addr.port()));
        let local = PeerRecord::new(name, address, listening_addr.port(), id);

        info!(node = %local, "listening for connections");

        Ok(Self {
            routing_table: SyncRoutingTable::new(local.clone(), config.miss_threshold),
            protocol: config.protocol(),
            local,
            config,
            listening_addr,
            listener: Arc::new(Mutex::new(Some(listener))),
        })
    }

    /// Returns the node's own record.
    pub fn local(&self) -> &PeerRecord {
        &self.local
    }

    pub fn routing_table(&self) -> &SyncRoutingTable {
        &self.routing_table
    }

    pub fn listening_addr(&self) -> SocketAddr {
        self.listening_addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the liveness engine probing this node's peers.
    pub fn liveness(&self) -> Liveness {
        Liveness::new(
            self.local.clone(),
            self.routing_table.clone(),
            self.protocol,
            self.config.heartbeat_interval,
            self.config.probe_timeout,
        )
    }

    /// Starts accepting connections and sending heartbeats. Both tasks run until the returned
    /// handle is shut down or dropped, which also closes the listener.
    pub fn start(&self) -> Result<NodeHandle, NodeError> {
        let listener = self.listener.lock().take().ok_or(NodeError::AlreadyStarted)?;
        let span = tracing::info_span!("node", peer = %self.local.name(), id = %self.local.id());

        let node = self.clone();
        let accept = tokio::spawn(node.accept_loop(listener).instrument(span.clone()));
        let liveness = tokio::spawn(self.liveness().run().instrument(span));

        Ok(NodeHandle {
            tasks: vec![accept, liveness],
        })
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let node = self.clone();
                    tokio::spawn(
                        async move {
                            if let Err(e) = node.handle_connection(stream).await {
                                warn!(%addr, "dropped inbound connection: {e}");
                            }
                        }
                        .in_current_span(),
                    );
                }
                Err(e) => {
                    warn!("failed to accept a connection: {e}");
                    // Usually out of file descriptors, give in-flight connections time to finish.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Keeps a started node's tasks alive.
#[must_use = "dropping the handle stops the node"]
#[derive(Debug)]
pub struct NodeHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Stops accepting connections and sending heartbeats. In-flight probes are aborted.
    pub fn shutdown(self) {
        drop(self)
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
