use std::{collections::HashMap, fmt, iter};

use tracing::{debug, info, trace};

use crate::core::{
    id::Id,
    message::{Message, MessageKind, Response},
    peer::PeerRecord,
};

/// The number of slots in a table, one per shared-prefix length plus the clamped catch-all.
pub const SLOTS: usize = Id::BITS as usize + 1;

/// The default number of consecutive missed heartbeats after which a peer is evicted.
pub const DEFAULT_MISS_THRESHOLD: u8 = 3;

/// What [`RoutingTable::push_bucket`] did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The slot was empty and now holds the candidate.
    Inserted(usize),
    /// The candidate displaced the previous occupant.
    Replaced(usize),
    /// The occupant was kept, the candidate discarded.
    Kept(usize),
}

/// What a failed liveness probe did to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissOutcome {
    /// The peer stays, with this many consecutive misses.
    Missed(u8),
    /// The peer reached the threshold and was removed from its slot.
    Evicted,
    /// The peer no longer occupies a slot, nothing was recorded.
    Untracked,
}

/// The core routing table data structure.
///
/// Each slot holds at most one peer, selected by the length of the prefix it shares with the
/// local identifier. Slot 0 holds the most distant peer.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    // The node's own record.
    local: PeerRecord,
    // One optional peer per shared-prefix length, always `SLOTS` long.
    slots: Vec<Option<PeerRecord>>,
    // Consecutive missed heartbeats per peer, absent means none.
    miss_counts: HashMap<Id, u8>,
    // Evict a peer once it has missed this many heartbeats in a row.
    miss_threshold: u8,
}

impl RoutingTable {
    /// Creates an empty routing table for the local node.
    pub fn new(local: PeerRecord) -> Self {
        Self::with_miss_threshold(local, DEFAULT_MISS_THRESHOLD)
    }

    pub fn with_miss_threshold(local: PeerRecord, miss_threshold: u8) -> Self {
        Self {
            local,
            slots: vec![None; SLOTS],
            miss_counts: HashMap::new(),
            miss_threshold: miss_threshold.max(1),
        }
    }

    /// Returns the local node's record.
    pub fn local(&self) -> &PeerRecord {
        &self.local
    }

    /// Returns this table's local identifier.
    pub fn local_id(&self) -> Id {
        self.local.id()
    }

    /// Returns the slot index an identifier maps to.
    pub fn slot_index(&self, id: Id) -> usize {
        (self.local_id().shared_prefix_len(&id) as usize).min(SLOTS - 1)
    }

    /// Returns the occupant of a slot, if any.
    pub fn slot(&self, index: usize) -> Option<&PeerRecord> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a peer with this identifier occupies its slot.
    pub fn contains(&self, id: Id) -> bool {
        self.slot(self.slot_index(id))
            .is_some_and(|occupant| occupant.id() == id)
    }

    /// Offers a candidate for the slot matching its distance to the local identifier. An occupied
    /// slot keeps whichever record has the numerically smaller identifier.
    ///
    /// Every candidate is placed, including one carrying the local identifier, which lands in the
    /// last slot.
    pub fn push_bucket(&mut self, candidate: PeerRecord) -> Placement {
        let i = self.slot_index(candidate.id());

        match &self.slots[i] {
            None => {
                debug!(peer = %candidate, slot = i, "added peer");
                self.slots[i] = Some(candidate);
                Placement::Inserted(i)
            }
            Some(occupant) if candidate.id() < occupant.id() => {
                debug!(kept = %candidate, dropped = %occupant, slot = i, "replaced peer");
                // The loser's liveness history goes with it.
                let dropped = occupant.id();
                self.miss_counts.remove(&dropped);
                self.slots[i] = Some(candidate);
                Placement::Replaced(i)
            }
            Some(occupant) => {
                trace!(kept = %occupant, dropped = %candidate, slot = i, "kept peer");
                Placement::Kept(i)
            }
        }
    }

    /// Offers every candidate in order.
    pub fn refresh_buckets<I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = PeerRecord>,
    {
        for candidate in candidates {
            self.push_bucket(candidate);
        }

        debug!("routing table of {}:\n{}", self.local.name(), self);
    }

    /// Returns a snapshot of all known peers, closest slot last.
    pub fn get_peers(&self) -> Vec<PeerRecord> {
        self.slots.iter().flatten().cloned().collect()
    }

    /// Returns the number of consecutive heartbeats the peer has missed.
    pub fn miss_count(&self, id: Id) -> u8 {
        self.miss_counts.get(&id).copied().unwrap_or(0)
    }

    /// Records a failed probe, evicting the peer once it reaches the miss threshold.
    pub fn record_miss(&mut self, id: Id) -> MissOutcome {
        if !self.contains(id) {
            self.miss_counts.remove(&id);
            return MissOutcome::Untracked;
        }

        let misses = self.miss_counts.entry(id).or_insert(0);
        *misses = misses.saturating_add(1);
        let misses = *misses;

        if misses >= self.miss_threshold {
            info!(%id, misses, "evicting unresponsive peer");
            self.remove(id);
            MissOutcome::Evicted
        } else {
            debug!(%id, misses, threshold = self.miss_threshold, "missed heartbeat");
            MissOutcome::Missed(misses)
        }
    }

    /// Records a heartbeat reply, the peer's miss count drops back to zero.
    pub fn record_success(&mut self, id: Id) {
        if self.miss_counts.remove(&id).is_some() {
            debug!(%id, "peer is responsive again");
        }
    }

    /// Removes a peer and its liveness history, returning the removed record.
    pub fn remove(&mut self, id: Id) -> Option<PeerRecord> {
        self.miss_counts.remove(&id);

        let i = self.slot_index(id);
        match &self.slots[i] {
            Some(occupant) if occupant.id() == id => self.slots[i].take(),
            _ => None,
        }
    }

    // MESSAGE PROCESSING

    /// Processes a message received on an inbound connection and returns the reply owed to the
    /// sender, if any.
    pub fn process_message(&mut self, message: Message) -> Option<Response> {
        match message.kind {
            MessageKind::Hello => {
                info!(sender = %message.sender, "hello received");
                self.learn(message.sender, message.peers);

                Some(Response::Welcome(self.get_peers()))
            }
            MessageKind::Heartbeat => {
                trace!(sender = %message.sender, "heartbeat received");
                Some(Response::Heartbeat)
            }
            // Welcomes are only expected as replies on connections we opened.
            MessageKind::Welcome => None,
        }
    }

    /// Processes a welcome received in reply to our hello.
    pub fn process_welcome(&mut self, message: Message) {
        if message.kind != MessageKind::Welcome {
            return;
        }

        info!(sender = %message.sender, peers = message.peers.len(), "welcome received");
        self.learn(message.sender, message.peers);
    }

    // Offers the sender and the peers it knows about. Our own record, echoed back by the remote
    // side, is skipped so the node never probes itself.
    fn learn(&mut self, sender: PeerRecord, peers: Vec<PeerRecord>) {
        let local = self.local.clone();
        let candidates = iter::once(sender)
            .chain(peers)
            .filter(|candidate| !candidate.is_same_endpoint(&local));

        self.refresh_buckets(candidates);
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(peer) => writeln!(f, "bucket {i}: {peer}")?,
                None => writeln!(f, "bucket {i}: ---")?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{seq::SliceRandom, thread_rng, Rng};

    use super::*;
    use crate::core::message::Protocol;

    fn peer(id: u16) -> PeerRecord {
        PeerRecord::new(format!("peer-{id:04x}"), "127.0.0.1", id, Id::new(id))
    }

    fn table(id: u16) -> RoutingTable {
        RoutingTable::new(PeerRecord::new("local", "127.0.0.1", 1, Id::new(id)))
    }

    #[test]
    fn new() {
        let rt = table(0x1234);

        assert_eq!(rt.slots.len(), Id::BITS as usize + 1);
        assert!(rt.is_empty());
        assert!(rt.get_peers().is_empty());
        assert!(rt.miss_counts.is_empty());
    }

    #[test]
    fn push_bucket_last_bit_differs() {
        let mut rt = table(0x1234);

        // 0x1234 ^ 0x1235 = 0000 0000 0000 0001 -> 15 shared bits.
        assert_eq!(rt.push_bucket(peer(0x1235)), Placement::Inserted(15));
        assert_eq!(rt.slot(15), Some(&peer(0x1235)));
    }

    #[test]
    fn push_bucket_smaller_id_wins() {
        let mut rt = table(0xf000);

        // Both share no prefix with 0xf000.
        assert_eq!(rt.push_bucket(peer(0x00ff)), Placement::Inserted(0));
        assert_eq!(rt.push_bucket(peer(0x0001)), Placement::Replaced(0));

        assert_eq!(rt.get_peers(), vec![peer(0x0001)]);

        // A larger identifier doesn't displace the occupant.
        assert_eq!(rt.push_bucket(peer(0x00ff)), Placement::Kept(0));
        assert_eq!(rt.get_peers(), vec![peer(0x0001)]);
    }

    #[test]
    fn push_bucket_same_id_clamps_to_last_slot() {
        let mut rt = table(0x1234);

        // A different node that collided on the identifier.
        let twin = PeerRecord::new("twin", "127.0.0.1", 2, Id::new(0x1234));
        assert_eq!(rt.push_bucket(twin.clone()), Placement::Inserted(Id::BITS as usize));
        assert_eq!(rt.slot(Id::BITS as usize), Some(&twin));
    }

    #[test]
    fn push_bucket_self() {
        let mut rt = table(0x1234);
        let local = rt.local().clone();

        assert_eq!(rt.push_bucket(local.clone()), Placement::Inserted(Id::BITS as usize));
        assert_eq!(rt.slot(Id::BITS as usize), Some(&local));
    }

    #[test]
    fn push_bucket_idempotent() {
        let mut rt = table(0x1234);
        rt.refresh_buckets([peer(0x0001), peer(0x1000), peer(0x1230)]);

        let before = rt.get_peers();
        assert_eq!(rt.push_bucket(peer(0x1000)), Placement::Kept(6));
        assert_eq!(rt.get_peers(), before);
    }

    #[test]
    fn push_bucket_keeps_minimum_offered() {
        const N: usize = 1000;

        let mut rng = thread_rng();
        let local: u16 = rng.gen();
        let mut rt = table(local);
        let mut minimums: HashMap<usize, u16> = HashMap::new();

        for _ in 0..N {
            let id: u16 = rng.gen();
            let candidate = PeerRecord::new("c", "10.0.0.1", id, Id::new(id));

            let i = rt.slot_index(Id::new(id));
            assert_eq!(
                i,
                (Id::new(local).shared_prefix_len(&Id::new(id)) as usize).min(16)
            );

            rt.push_bucket(candidate);
            minimums
                .entry(i)
                .and_modify(|min| *min = (*min).min(id))
                .or_insert(id);
        }

        for (i, min) in minimums {
            assert_eq!(rt.slot(i).map(PeerRecord::id), Some(Id::new(min)));
        }
    }

    #[test]
    fn refresh_buckets_permutation_invariant() {
        let mut rng = thread_rng();
        let local = table(rng.gen());

        let mut candidates: Vec<_> = (0..32).map(|_| peer(rng.gen())).collect();
        candidates.sort_by_key(PeerRecord::id);
        candidates.dedup_by_key(|c| c.id());

        let mut expected = local.clone();
        expected.refresh_buckets(candidates.clone());

        for _ in 0..10 {
            candidates.shuffle(&mut rng);

            let mut rt = local.clone();
            rt.refresh_buckets(candidates.clone());
            assert_eq!(rt.get_peers(), expected.get_peers());
        }
    }

    #[test]
    fn get_peers_is_ordered_by_slot() {
        let mut rt = table(0x0000);
        // Slots 15, 0 and 7.
        rt.refresh_buckets([peer(0x0001), peer(0x8000), peer(0x0100)]);

        assert_eq!(
            rt.get_peers(),
            vec![peer(0x8000), peer(0x0100), peer(0x0001)]
        );
    }

    #[test]
    fn get_peers_is_a_snapshot() {
        let mut rt = table(0x0000);
        rt.push_bucket(peer(0x8000));

        let snapshot = rt.get_peers();
        rt.remove(Id::new(0x8000));
        rt.push_bucket(peer(0x0001));

        assert_eq!(snapshot, vec![peer(0x8000)]);
    }

    #[test]
    fn three_misses_evict() {
        let mut rt = table(0x1234);
        let id = Id::new(0x0001);
        rt.push_bucket(peer(0x0001));

        assert_eq!(rt.record_miss(id), MissOutcome::Missed(1));
        assert_eq!(rt.record_miss(id), MissOutcome::Missed(2));
        assert_eq!(rt.miss_count(id), 2);
        assert_eq!(rt.record_miss(id), MissOutcome::Evicted);

        assert!(!rt.contains(id));
        assert!(rt.get_peers().is_empty());
        assert!(!rt.miss_counts.contains_key(&id));
    }

    #[test]
    fn success_resets_misses() {
        let mut rt = table(0x1234);
        let id = Id::new(0x0001);
        rt.push_bucket(peer(0x0001));

        rt.record_miss(id);
        rt.record_miss(id);
        rt.record_success(id);

        assert_eq!(rt.miss_count(id), 0);
        assert!(!rt.miss_counts.contains_key(&id));

        // The count starts over, two more misses aren't enough.
        rt.record_miss(id);
        assert_eq!(rt.record_miss(id), MissOutcome::Missed(2));
        assert!(rt.contains(id));
    }

    #[test]
    fn miss_for_departed_peer() {
        let mut rt = table(0xf000);
        rt.push_bucket(peer(0x00ff));
        rt.record_miss(Id::new(0x00ff));

        // Displacing the occupant drops its history.
        rt.push_bucket(peer(0x0001));
        assert_eq!(rt.miss_count(Id::new(0x00ff)), 0);

        // A late probe outcome for the displaced peer doesn't touch the new occupant.
        assert_eq!(rt.record_miss(Id::new(0x00ff)), MissOutcome::Untracked);
        assert_eq!(rt.miss_count(Id::new(0x0001)), 0);
        assert!(rt.contains(Id::new(0x0001)));
    }

    #[test]
    fn custom_miss_threshold() {
        let mut rt = RoutingTable::with_miss_threshold(
            PeerRecord::new("local", "127.0.0.1", 1, Id::new(0x1234)),
            1,
        );
        rt.push_bucket(peer(0x0001));

        assert_eq!(rt.record_miss(Id::new(0x0001)), MissOutcome::Evicted);
    }

    #[test]
    fn remove_non_existant() {
        let mut rt = table(0xf000);
        rt.push_bucket(peer(0x0001));

        // Same slot, different peer.
        assert!(rt.remove(Id::new(0x00ff)).is_none());
        assert_eq!(rt.remove(Id::new(0x0001)), Some(peer(0x0001)));
    }

    #[test]
    fn process_hello() {
        let protocol = Protocol::default();
        let mut rt = table(0xf000);

        let hello = protocol.message(MessageKind::Hello, &peer(0x8000), vec![peer(0x0001)]);
        let response = rt.process_message(hello);

        assert_eq!(
            response,
            Some(Response::Welcome(vec![peer(0x0001), peer(0x8000)]))
        );
    }

    #[test]
    fn process_heartbeat() {
        let protocol = Protocol::default();
        let mut rt = table(0xf000);

        let heartbeat = protocol.message(MessageKind::Heartbeat, &peer(0x8000), vec![]);

        assert_eq!(rt.process_message(heartbeat), Some(Response::Heartbeat));
        // The receiving side doesn't learn about the prober.
        assert!(rt.is_empty());
    }

    #[test]
    fn process_unexpected_welcome() {
        let protocol = Protocol::default();
        let mut rt = table(0xf000);

        let welcome = protocol.message(MessageKind::Welcome, &peer(0x8000), vec![peer(0x0001)]);

        assert!(rt.process_message(welcome).is_none());
        assert!(rt.is_empty());
    }

    #[test]
    fn process_welcome() {
        let protocol = Protocol::default();
        let mut rt = table(0xf000);
        let local = rt.local().clone();

        // The responder echoes us back in its peer list.
        let welcome =
            protocol.message(MessageKind::Welcome, &peer(0x8000), vec![peer(0x0001), local]);
        rt.process_welcome(welcome);

        assert_eq!(rt.get_peers(), vec![peer(0x0001), peer(0x8000)]);
    }

    #[test]
    fn process_hello_skips_local_record() {
        let protocol = Protocol::default();
        let mut rt = table(0xf000);
        let local = rt.local().clone();

        let hello = protocol.message(MessageKind::Hello, &peer(0x8000), vec![local.clone()]);
        rt.process_message(hello);
        assert_eq!(rt.get_peers(), vec![peer(0x8000)]);

        // A hello we sent to ourselves.
        let hello = protocol.message(MessageKind::Hello, &local, vec![]);
        rt.process_message(hello);
        assert!(rt.slot(Id::BITS as usize).is_none());
    }

    #[test]
    fn display() {
        let mut rt = table(0x0000);
        rt.push_bucket(peer(0x8000));

        let rendered = rt.to_string();
        assert_eq!(rendered.lines().count(), SLOTS);
        assert!(rendered.starts_with("bucket 0: peer-8000 [8000] at 127.0.0.1:32768"));
        assert!(rendered.contains("bucket 16: ---"));
    }
}
