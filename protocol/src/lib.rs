// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Murmur Protocol — Core Library
//!
//! A rumor-mongering gossip node for the network that actually exists:
//! lossy, reordering, occasionally absent. Murmur nodes spread user messages
//! across a dynamically-discovered overlay of UDP endpoints, reconcile state
//! with periodic anti-entropy, and derive point-to-point routes from the
//! same rumor flow.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! gossip node:
//!
//! - **gossip** — The gossiper itself: packet codec, peer registry, rumor
//!   store, DSDV routing, mongering timers, watchers, and the UDP pump.
//! - **config** — Protocol constants and network defaults.
//!
//! ## Design Philosophy
//!
//! 1. All reliability lives in the protocol, none in the transport. UDP
//!    drops; anti-entropy repairs.
//! 2. Every node owns its own randomness — tests run dozens of nodes in one
//!    process and a shared generator would couple them.
//! 3. Steady-state network errors are logged and swallowed. The only error
//!    a caller ever sees is a failure to bind.

pub mod config;
pub mod gossip;

pub use gossip::{
    Acceptance, GossipError, GossipPacket, Gossiper, PeerStatus, PrivateMessage, RouteEntry,
    RumorMessage, SimpleMessage, StatusMessage, WatchedPacket,
};
