//! Protocol identifier types.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A 16-bit identifier that implements a non-euclidian XOR-based distance metric.
///
/// On the wire an identifier is rendered as four lowercase hex digits. Parsing accepts one to
/// four hex digits in either case, without a sign or prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u16);

impl Id {
    /// The size of the identifier in bytes.
    pub const BYTES: usize = 2;

    /// The size of the identifier in bits.
    pub const BITS: u32 = u16::BITS;

    /// Creates a new identifier from its numeric value.
    pub const fn new(raw: u16) -> Self {
        Id(raw)
    }

    /// Returns the numeric value backing the identifier.
    pub const fn value(&self) -> u16 {
        self.0
    }

    #[doc(hidden)]
    /// Convenience function for generating random identifiers during testing.
    pub fn rand() -> Self {
        use rand::{thread_rng, Rng};

        Id(thread_rng().gen())
    }

    /// Returns the XOR distance between two identifiers.
    pub fn distance(&self, other: &Id) -> u16 {
        self.0 ^ other.0
    }

    /// Computes the number of leading bits shared by both identifiers.
    ///
    /// Equal identifiers share all [`Id::BITS`] bits.
    pub fn shared_prefix_len(&self, other: &Id) -> u32 {
        self.distance(other).leading_zeros()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// The string isn't a hex identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected 1 to 4 hex digits, found {0:?}")]
pub struct ParseIdError(String);

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = (1..=Self::BITS as usize / 4).contains(&s.len());
        // `from_str_radix` alone would also take a leading sign.
        if !digits || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseIdError(s.to_owned()));
        }

        u16::from_str_radix(s, 16)
            .map(Id)
            .map_err(|_| ParseIdError(s.to_owned()))
    }
}

impl From<u16> for Id {
    fn from(raw: u16) -> Self {
        Id(raw)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex.parse()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&hex), &"a 16-bit hex id"))
    }
}
