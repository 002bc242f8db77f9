//! # Gossip Module
//!
//! The gossiper subsystem: everything between a UDP datagram arriving and a
//! user callback firing.
//!
//! ```text
//! packet.rs   — JSON wire codec for the four message variants
//! peers.rs    — ordered, deduplicated registry of known UDP endpoints
//! rumors.rs   — per-origin rumor log and want-vector arithmetic
//! routing.rs  — DSDV-style next-hop table fed by the rumor flow
//! monger.rs   — pending acknowledgement records for in-flight rumors
//! watcher.rs  — fan-out of packet events to test/UI observers
//! gossiper.rs — the node: socket pump, handlers, tickers, public ops
//! ```
//!
//! ## Design Decisions
//!
//! - The wire format is a JSON object with exactly one non-null field.
//!   Internally that is a struct of four `Option`s validated at the codec
//!   boundary — one dispatch on the decoded variant, no trait objects.
//! - Rumor acceptance and routing updates are serialized on the receive
//!   task; the stores are behind `parking_lot` locks only so snapshots and
//!   tickers can read them. Lock order is peers → rumors → routes.
//! - The pending-mongering set is a `DashMap` keyed by (origin, id, peer)
//!   with a generation counter, so a late deadline task never kills a
//!   fresher entry for the same key.

pub mod gossiper;
pub mod monger;
pub mod packet;
pub mod peers;
pub mod routing;
pub mod rumors;
pub mod watcher;

pub use gossiper::{GossipError, Gossiper};
pub use monger::{PendingKey, PendingMongers};
pub use packet::{
    GossipPacket, PacketError, PeerStatus, PrivateMessage, RumorMessage, SimpleMessage,
    StatusMessage,
};
pub use peers::{PeerError, PeerRegistry};
pub use routing::{RouteEntry, RoutingTable};
pub use rumors::{Acceptance, RumorStore, StatusDiff};
pub use watcher::{PacketStream, WatchedPacket, Watcher};
