//! Foundational and often-reused types.

pub(crate) mod id;
pub(crate) mod identity;
pub mod message;
pub(crate) mod peer;
pub(crate) mod routing_table;
