use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{
    id::Id,
    message::{Message, Response},
    peer::PeerRecord,
    routing_table::{MissOutcome, Placement, RoutingTable},
};

#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[derive(Debug, Clone)]
/// A routing table implementation suitable for use in async contexts.
///
/// It wraps [`RoutingTable`] behind a lock shared by the listener, the bootstrap exchange and the
/// liveness task. Every method takes the lock exactly once, so operations never interleave.
pub struct SyncRoutingTable {
    routing_table: Arc<RwLock<RoutingTable>>,
}

impl SyncRoutingTable {
    pub fn new(local: PeerRecord, miss_threshold: u8) -> Self {
        Self {
            routing_table: Arc::new(RwLock::new(RoutingTable::with_miss_threshold(
                local,
                miss_threshold,
            ))),
        }
    }

    pub fn push_bucket(&self, candidate: PeerRecord) -> Placement {
        self.routing_table.write().push_bucket(candidate)
    }

    pub fn refresh_buckets(&self, candidates: Vec<PeerRecord>) {
        self.routing_table.write().refresh_buckets(candidates)
    }

    pub fn get_peers(&self) -> Vec<PeerRecord> {
        self.routing_table.read().get_peers()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.routing_table.read().contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.routing_table.read().is_empty()
    }

    pub fn miss_count(&self, id: Id) -> u8 {
        self.routing_table.read().miss_count(id)
    }

    pub fn record_miss(&self, id: Id) -> MissOutcome {
        self.routing_table.write().record_miss(id)
    }

    pub fn record_success(&self, id: Id) {
        self.routing_table.write().record_success(id)
    }

    pub fn process_message(&self, message: Message) -> Option<Response> {
        self.routing_table.write().process_message(message)
    }

    pub fn process_welcome(&self, message: Message) {
        self.routing_table.write().process_welcome(message)
    }
}
