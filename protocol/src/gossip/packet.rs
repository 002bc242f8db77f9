//! # Wire Codec
//!
//! One UDP datagram carries one JSON object with exactly one non-null field
//! among `simple`, `rumor`, `status`, and `private`. The codec enforces that
//! rule on both directions: encoding a packet with zero or several variants
//! is a bug surfaced as an error, and a datagram that decodes to zero or
//! several variants is dropped by the receive loop.
//!
//! Unknown JSON fields are ignored so older nodes survive newer senders.
//! A missing field *inside* a selected variant is a decode failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Codec failures. Both directions are covered: `Json` wraps serde errors,
/// `VariantCount` rejects packets that don't carry exactly one message.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The datagram was not the JSON shape we expect.
    #[error("malformed gossip packet: {0}")]
    Json(#[from] serde_json::Error),
    /// A packet must carry exactly one of simple/rumor/status/private.
    #[error("packet carries {0} message variants, expected exactly 1")]
    VariantCount(usize),
}

// ---------------------------------------------------------------------------
// Message Variants
// ---------------------------------------------------------------------------

/// Legacy broadcast-mode message. Flooded to every known peer; the relay
/// address is rewritten at each hop so receivers learn a way back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleMessage {
    /// Identifier of the node that originated the message.
    #[serde(rename = "originPeerName")]
    pub origin_peer_name: String,
    /// Address of the node that most recently relayed the message.
    #[serde(rename = "relayPeerAddr")]
    pub relay_peer_addr: String,
    /// The user text.
    pub contents: String,
}

/// A rumor: the unit of mongered gossip. Ids are per-origin and start at 1.
/// An empty `text` marks a route rumor — it updates routing tables but is
/// never surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RumorMessage {
    /// Identifier of the originating node.
    pub origin: String,
    /// Monotonic per-origin sequence number, starting at 1.
    pub id: u32,
    /// The user text; empty for route rumors.
    pub text: String,
}

impl RumorMessage {
    /// Route rumors carry no text — they exist only to propagate routes.
    pub fn is_route(&self) -> bool {
        self.text.is_empty()
    }
}

/// One entry of a want vector: "for `identifier`, the next rumor id I am
/// missing is `next_id`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// Origin this entry describes.
    pub identifier: String,
    /// Lowest rumor id not yet stored for that origin.
    #[serde(rename = "nextid")]
    pub next_id: u32,
}

/// Status packet: the full want vector of the sender. Doubles as the
/// acknowledgement for mongered rumors and as the anti-entropy probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// One entry per origin the sender has ever stored rumors for.
    pub want: Vec<PeerStatus>,
}

/// Point-to-point message forwarded hop by hop along the routing table.
/// Never stored, never acknowledged; the hop limit is the only loop guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    /// Identifier of the sender.
    pub origin: String,
    /// Sequence number; private messages are unsequenced and leave this 0.
    pub id: u32,
    /// The user text.
    pub text: String,
    /// Identifier of the intended recipient.
    pub destination: String,
    /// Remaining forwarding budget; decremented at each hop.
    #[serde(rename = "hoplimit")]
    pub hop_limit: u32,
}

// ---------------------------------------------------------------------------
// GossipPacket
// ---------------------------------------------------------------------------

/// The tagged union that travels on the wire. Exactly one field is `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GossipPacket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple: Option<SimpleMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rumor: Option<RumorMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<PrivateMessage>,
}

impl GossipPacket {
    /// Wraps a simple message.
    pub fn from_simple(simple: SimpleMessage) -> Self {
        Self {
            simple: Some(simple),
            ..Self::default()
        }
    }

    /// Wraps a rumor.
    pub fn from_rumor(rumor: RumorMessage) -> Self {
        Self {
            rumor: Some(rumor),
            ..Self::default()
        }
    }

    /// Wraps a status.
    pub fn from_status(status: StatusMessage) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Wraps a private message.
    pub fn from_private(private: PrivateMessage) -> Self {
        Self {
            private: Some(private),
            ..Self::default()
        }
    }

    /// Number of populated variants. Valid packets have exactly one.
    pub fn variant_count(&self) -> usize {
        [
            self.simple.is_some(),
            self.rumor.is_some(),
            self.status.is_some(),
            self.private.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Short variant tag for logging.
    pub fn kind(&self) -> &'static str {
        if self.simple.is_some() {
            "simple"
        } else if self.rumor.is_some() {
            "rumor"
        } else if self.status.is_some() {
            "status"
        } else if self.private.is_some() {
            "private"
        } else {
            "empty"
        }
    }

    /// Serializes the packet to one JSON datagram body.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates one datagram body.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let packet: GossipPacket = serde_json::from_slice(bytes)?;
        packet.validate()?;
        Ok(packet)
    }

    fn validate(&self) -> Result<(), PacketError> {
        match self.variant_count() {
            1 => Ok(()),
            n => Err(PacketError::VariantCount(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
