//! Peer discovery and liveness tracking for a simplified Kademlia overlay.
//!
//! A node keeps one peer per distance slot: the slot is the length of the prefix the peer's
//! identifier shares with the local one. Nodes join by sending a HELLO to a known peer, which
//! answers with a WELCOME listing the peers it knows. Every known peer is then probed with a
//! HEARTBEAT at a fixed interval and evicted after three consecutive misses.
//!
//! Notable differences with Kademlia:
//!
//! 1. A slot holds a single peer instead of a k-bucket.
//! 2. When two peers compete for a slot, the one with the numerically smaller identifier is
//!    kept, not the one closest to the local identifier.
//! 3. There are no lookups, nodes only learn about peers through HELLO and WELCOME exchanges.
//!
//! ## Wire format
//!
//! Messages are JSON objects carrying a `version`, a `type` (2 = WELCOME, 4 = HELLO,
//! 5 = HEARTBEAT), the `sender` and a list of `peers`. Every exchange happens on its own
//! short-lived TCP connection.

#![cfg_attr(doc_cfg, feature(doc_cfg))]

#[cfg(feature = "codec")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "codec")))]
pub mod codec;
pub mod config;
#[cfg(all(feature = "codec", feature = "sync"))]
#[cfg_attr(doc_cfg, doc(cfg(all(feature = "codec", feature = "sync"))))]
pub mod tcp;

mod core;

pub use crate::{
    config::Config,
    core::{
        id::{Id, ParseIdError},
        identity::{generate_id, random_port, PORT_RANGE},
        message,
        peer::PeerRecord,
        routing_table::{MissOutcome, Placement, RoutingTable, DEFAULT_MISS_THRESHOLD, SLOTS},
    },
};
