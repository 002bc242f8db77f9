//! # Pending-Mongering Records
//!
//! Every rumor sent during propagation expects a status back from its
//! recipient. This module tracks those expectations: one record per
//! `(origin, id, peer)` triple, inserted at send time, cleared either by a
//! covering status from that peer or by the mongering deadline.
//!
//! Records carry a generation number. The deadline task for a record only
//! removes the entry if the generation still matches, so re-mongering the
//! same rumor to the same peer later is never killed by a stale timer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::packet::PeerStatus;

/// Identity of one in-flight rumor transmission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    /// Origin of the mongered rumor.
    pub origin: String,
    /// Id of the mongered rumor.
    pub id: u32,
    /// Peer the rumor was sent to.
    pub peer: SocketAddr,
}

/// Concurrent set of pending-mongering records.
#[derive(Debug, Default)]
pub struct PendingMongers {
    entries: DashMap<PendingKey, u64>,
    generations: AtomicU64,
}

impl PendingMongers {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an in-flight rumor and returns the generation to hand to its
    /// deadline task.
    pub fn begin(&self, key: PendingKey) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, generation);
        generation
    }

    /// Deadline expiry: removes the record if it still belongs to the given
    /// generation. Returns `true` when the record was still pending (the
    /// peer never acknowledged) — the implicit "tails" outcome.
    pub fn expire(&self, key: &PendingKey, generation: u64) -> bool {
        self.entries
            .remove_if(key, |_, current| *current == generation)
            .is_some()
    }

    /// Clears every record for `peer` that the given want vector covers
    /// (the peer's next id for the origin is past the rumor's id), and
    /// returns the cleared keys so the caller can run the coin flip.
    pub fn acked(&self, peer: SocketAddr, want: &[PeerStatus]) -> Vec<PendingKey> {
        let cleared: Vec<PendingKey> = self
            .entries
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.peer == peer
                    && want
                        .iter()
                        .any(|status| status.identifier == key.origin && status.next_id > key.id)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for key in &cleared {
            self.entries.remove(key);
        }
        cleared
    }

    /// Number of in-flight records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
