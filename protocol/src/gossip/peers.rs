//! # Peer Registry
//!
//! Ordered set of known UDP endpoints. Order is first-insertion order and is
//! observable through the node-listing operation, so the registry never
//! reorders. Deduplication is by canonical textual form of the resolved
//! address.

use std::net::{SocketAddr, ToSocketAddrs};

use parking_lot::RwLock;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Errors from peer registration.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Some peer strings did not resolve to a UDP endpoint. The resolvable
    /// ones were still registered.
    #[error("failed to resolve peer addresses: {bad:?}")]
    Unresolvable {
        /// The strings that could not be resolved.
        bad: Vec<String>,
    },
}

/// Insertion-ordered, duplicate-free list of peer endpoints.
///
/// Reads vastly outnumber writes (every monger pick and every broadcast
/// walks the list), so the vector sits behind a `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<SocketAddr>>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an endpoint if it is not already present. Returns `true` when
    /// the endpoint was new.
    pub fn add(&self, addr: SocketAddr) -> bool {
        let mut peers = self.peers.write();
        if peers.contains(&addr) {
            return false;
        }
        debug!(peer = %addr, "learned new peer");
        peers.push(addr);
        true
    }

    /// Resolves and inserts a batch of peer strings.
    ///
    /// Malformed entries are skipped but reported: the resolvable addresses
    /// are all registered first, then an [`PeerError::Unresolvable`] naming
    /// the rejects is returned if there were any.
    pub fn add_many<S: AsRef<str>>(&self, addrs: &[S]) -> Result<(), PeerError> {
        let mut bad = Vec::new();

        for raw in addrs {
            let raw = raw.as_ref();
            match raw.to_socket_addrs() {
                Ok(mut resolved) => match resolved.next() {
                    Some(addr) => {
                        self.add(addr);
                    }
                    None => bad.push(raw.to_string()),
                },
                Err(_) => bad.push(raw.to_string()),
            }
        }

        if bad.is_empty() {
            Ok(())
        } else {
            Err(PeerError::Unresolvable { bad })
        }
    }

    /// Returns `true` if the endpoint is registered.
    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.peers.read().contains(&addr)
    }

    /// Independent copy of the registry in insertion order, textual form.
    pub fn snapshot(&self) -> Vec<String> {
        self.peers.read().iter().map(|a| a.to_string()).collect()
    }

    /// Independent copy of the registry in insertion order.
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.peers.read().clone()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// `true` when no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Picks one peer uniformly at random among those not in `exclude`.
    ///
    /// The draw happens over the filtered list, so every eligible peer has
    /// equal probability and an excluded peer can never be returned.
    pub fn random<R: Rng>(&self, rng: &mut R, exclude: &[SocketAddr]) -> Option<SocketAddr> {
        let peers = self.peers.read();
        let eligible: Vec<SocketAddr> = peers
            .iter()
            .copied()
            .filter(|p| !exclude.contains(p))
            .collect();

        if eligible.is_empty() {
            return None;
        }
        Some(eligible[rng.gen_range(0..eligible.len())])
    }
}
