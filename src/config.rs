//! Node configuration.

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use crate::{core::routing_table::DEFAULT_MISS_THRESHOLD, message::Protocol, Id};

/// The configuration of a node, all values have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The IP the listener binds to, also advertised to peers unless `advertised_ip` is set.
    pub listener_ip: IpAddr,
    /// The IP peers should dial, required when listening on an unspecified address such as
    /// `0.0.0.0`.
    pub advertised_ip: Option<IpAddr>,
    /// The port the listener binds to. `None` picks a random port from
    /// [`PORT_RANGE`](crate::PORT_RANGE), `Some(0)` lets the OS choose.
    pub listener_port: Option<u16>,
    /// Overrides the identifier derived from the listening address.
    pub local_id: Option<Id>,
    /// The version stamped on outgoing messages.
    pub protocol_version: u32,
    /// The period between two rounds of heartbeats.
    pub heartbeat_interval: Duration,
    /// The time a single heartbeat probe may take, connecting and awaiting the reply included.
    pub probe_timeout: Duration,
    /// The time an inbound connection or the bootstrap exchange may take.
    pub session_timeout: Duration,
    /// The number of consecutive missed heartbeats after which a peer is evicted.
    pub miss_threshold: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            advertised_ip: None,
            listener_port: None,
            local_id: None,
            protocol_version: Protocol::DEFAULT_VERSION,
            heartbeat_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            session_timeout: Duration::from_secs(5),
            miss_threshold: DEFAULT_MISS_THRESHOLD,
        }
    }
}

impl Config {
    pub fn protocol(&self) -> Protocol {
        Protocol::new(self.protocol_version)
    }
}
