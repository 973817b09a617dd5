//! Protocol message types and the JSON wire format.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{error::Category, Value};
use thiserror::Error;
use tracing::debug;

use crate::core::peer::PeerRecord;

/// The wire tag of each message variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageKind {
    /// WELCOME is the correct response to HELLO, it carries the responder's known peers.
    Welcome = 2,
    /// HELLO introduces the sender and the peers it knows about.
    Hello = 4,
    /// HEARTBEAT is both the liveness probe and its reply.
    Heartbeat = 5,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Welcome => "welcome",
            MessageKind::Hello => "hello",
            MessageKind::Heartbeat => "heartbeat",
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            2 => Ok(MessageKind::Welcome),
            4 => Ok(MessageKind::Hello),
            5 => Ok(MessageKind::Heartbeat),
            _ => Err(format!("unknown message type {tag}")),
        }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Message {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender: PeerRecord,
    #[serde(default)]
    pub peers: Vec<PeerRecord>,
}

impl Message {
    pub fn variant_as_str(&self) -> &str {
        self.kind.as_str()
    }

    // Heartbeats never carry peers, whatever the sender put on the wire.
    pub(crate) fn normalize(mut self) -> Self {
        if self.kind == MessageKind::Heartbeat {
            self.peers.clear();
        }

        self
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Message::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_record(deserializer, |value| Message::deserialize(value))
    }
}

/// Deserializes a record that must appear on the wire as an object with named fields, positional
/// arrays and scalars are rejected.
pub(crate) fn deserialize_record<'de, D, T, F>(deserializer: D, from_value: F) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    F: FnOnce(Value) -> Result<T, serde_json::Error>,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => from_value(value).map_err(de::Error::custom),
        _ => Err(de::Error::custom("expected a record with named fields")),
    }
}

/// The reply a node owes to an inbound message, built by the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Welcome(Vec<PeerRecord>),
    Heartbeat,
}

/// Why some bytes couldn't be turned into a [`Message`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message is truncated")]
    Truncated,
    #[error("message is not valid json: {0}")]
    Malformed(String),
    #[error("message is missing or has invalid fields: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Eof => ParseError::Truncated,
            Category::Syntax | Category::Io => ParseError::Malformed(e.to_string()),
            Category::Data => ParseError::Invalid(e.to_string()),
        }
    }
}

/// Builds, encodes and decodes messages for one protocol version.
///
/// The version is stamped on every outgoing message. Incoming messages with a different version
/// are still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    version: u32,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VERSION)
    }
}

impl Protocol {
    pub const DEFAULT_VERSION: u32 = 18;

    pub fn new(version: u32) -> Self {
        Self { version }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Builds a message sent by `sender`.
    pub fn message(&self, kind: MessageKind, sender: &PeerRecord, peers: Vec<PeerRecord>) -> Message {
        Message {
            version: self.version,
            kind,
            sender: sender.clone(),
            peers,
        }
        .normalize()
    }

    /// Turns a routing table response into the message `local` sends back.
    pub fn respond(&self, local: &PeerRecord, response: Response) -> Message {
        match response {
            Response::Welcome(peers) => self.message(MessageKind::Welcome, local, peers),
            Response::Heartbeat => self.message(MessageKind::Heartbeat, local, vec![]),
        }
    }

    /// Serializes a message to its wire form.
    pub fn encode(
        &self,
        kind: MessageKind,
        sender: &PeerRecord,
        peers: &[PeerRecord],
    ) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.message(kind, sender, peers.to_vec()))
    }

    /// Parses a single message, the input must contain nothing but the message and whitespace.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, ParseError> {
        let message: Message = serde_json::from_slice(bytes)?;
        self.check_version(&message);

        Ok(message.normalize())
    }

    pub(crate) fn check_version(&self, message: &Message) {
        if message.version != self.version {
            debug!(
                local = self.version,
                remote = message.version,
                "accepting message with a different protocol version"
            );
        }
    }
}
