//! Peer records exchanged over the wire and stored in the routing table.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::{id::Id, message::deserialize_record};

/// A peer's identity and listening address.
///
/// Records are immutable once built, the identifier is never recomputed. Two records describe
/// the same peer if their identifiers match, see [`PeerRecord::is_same_peer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct PeerRecord {
    #[serde(default)]
    name: String,
    #[serde(alias = "ip")]
    address: String,
    port: u16,
    id: Id,
}

impl PeerRecord {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16, id: Id) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            id,
        }
    }

    /// The human readable peer name, empty if the peer didn't advertise one.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns `true` if both records carry the same identifier.
    pub fn is_same_peer(&self, other: &PeerRecord) -> bool {
        self.id == other.id
    }

    /// Returns `true` if both records carry the same identifier and listening address.
    pub(crate) fn is_same_endpoint(&self, other: &PeerRecord) -> bool {
        self.is_same_peer(other) && self.address == other.address && self.port == other.port
    }
}

impl Serialize for PeerRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PeerRecord::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for PeerRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_record(deserializer, |value| PeerRecord::deserialize(value))
    }
}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] at {}:{}", self.name, self.id, self.address, self.port)
    }
}
