//! Node identity generation.

use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

use crate::core::id::Id;

/// The range ephemeral listening ports are drawn from.
pub const PORT_RANGE: std::ops::Range<u16> = 1024..41024;

/// Derives a node identifier from its listening address.
///
/// The identifier is the leading 16 bits of `SHA-256("{address}:{port}")`, so the same address
/// always maps to the same identifier.
pub fn generate_id(address: &str, port: u16) -> Id {
    let digest = Sha256::digest(format!("{address}:{port}").as_bytes());
    let mut bytes = [0; Id::BYTES];
    bytes.copy_from_slice(&digest[..Id::BYTES]);

    Id::new(u16::from_be_bytes(bytes))
}

/// Picks a random port to listen on.
pub fn random_port() -> u16 {
    thread_rng().gen_range(PORT_RANGE)
}
