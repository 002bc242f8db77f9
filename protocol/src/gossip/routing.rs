//! # Routing Table
//!
//! DSDV boiled down to its useful core: for every origin we have seen
//! rumors from, remember the endpoint that delivered the freshest one.
//! Rumor ids play the role of destination sequence numbers — an entry is
//! only replaced by strictly fresher information, so stale paths can never
//! displace current ones and forwarding stays loop-free.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::debug;

/// One routing entry: where to forward, and how fresh our knowledge is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Endpoint that delivered the freshest rumor for this origin.
    pub next_hop: SocketAddr,
    /// Highest rumor id observed from this origin.
    pub last_id: u32,
}

/// Map from origin identifier to its current next hop.
///
/// The caller (the rumor handler) guarantees the local identifier is never
/// offered, so the table cannot grow a self-loop.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: HashMap<String, RouteEntry>,
}

impl RoutingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one observed rumor into the table. Returns `true` when the
    /// entry for `origin` was created or updated.
    ///
    /// Update policy:
    /// - unknown origin, or `id` above the recorded one: take the new hop;
    /// - `id` equal: keep the existing hop if this is a route rumor from a
    ///   different endpoint (equal-sequence route rumors from several
    ///   neighbors would otherwise make the entry flap), update otherwise;
    /// - `id` below: stale, ignore.
    pub fn observe(&mut self, origin: &str, id: u32, from: SocketAddr, route_rumor: bool) -> bool {
        match self.routes.get_mut(origin) {
            None => {
                debug!(%origin, id, next_hop = %from, "new route");
                self.routes.insert(
                    origin.to_string(),
                    RouteEntry {
                        next_hop: from,
                        last_id: id,
                    },
                );
                true
            }
            Some(entry) if id > entry.last_id => {
                if entry.next_hop != from {
                    debug!(%origin, id, next_hop = %from, "route updated");
                }
                entry.next_hop = from;
                entry.last_id = id;
                true
            }
            Some(entry) if id == entry.last_id && !(route_rumor && entry.next_hop != from) => {
                entry.next_hop = from;
                true
            }
            Some(_) => false,
        }
    }

    /// Endpoint to forward traffic for `destination` to, if known.
    pub fn next_hop(&self, destination: &str) -> Option<SocketAddr> {
        self.routes.get(destination).map(|entry| entry.next_hop)
    }

    /// Origins we currently hold a route for, sorted.
    pub fn direct_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.routes.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Independent copy of the whole table.
    pub fn snapshot(&self) -> HashMap<String, RouteEntry> {
        self.routes.clone()
    }

    /// Number of routed origins.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` when no routes are known.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
