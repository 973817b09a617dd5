//! Node runtime over TCP: listener, sessions, bootstrap and heartbeats.

mod liveness;
mod node;
mod session;
mod sync;

pub use liveness::{Liveness, ProbeOutcome, TickReport};
pub use node::{Node, NodeError, NodeHandle};
pub use sync::SyncRoutingTable;
