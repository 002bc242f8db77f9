//! # Rumor Store
//!
//! In-memory log of every rumor this node has accepted, keyed by origin.
//! The id of the rumor at index `i` is `i + 1`, so ids for each origin are
//! always the contiguous prefix `1..=len` — no gaps, ever. Out-of-order
//! arrivals are simply not stored; anti-entropy fetches them again once the
//! gap closes.
//!
//! The store also owns the want-vector arithmetic: what we have, what we
//! are missing, and the difference against a remote's view.

use std::collections::BTreeMap;

use super::packet::{PeerStatus, RumorMessage};

/// Outcome of offering a rumor to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The rumor was the next expected id for its origin and was appended.
    New,
    /// Already stored (or id 0, which no valid rumor carries). No change.
    Duplicate,
    /// Ahead of the next expected id. Not stored; reconciliation catches up.
    Future,
}

/// Result of diffing the local store against a remote want vector.
#[derive(Debug, Clone, Default)]
pub struct StatusDiff {
    /// Rumors the remote is missing, ordered by origin then ascending id.
    pub to_send: Vec<RumorMessage>,
    /// `true` if the remote claims rumors we do not have.
    pub remote_ahead: bool,
}

impl StatusDiff {
    /// Both sides hold the same rumors.
    pub fn in_sync(&self) -> bool {
        self.to_send.is_empty() && !self.remote_ahead
    }
}

/// Per-origin rumor log.
///
/// A `BTreeMap` rather than a hash map: want vectors and diffs iterate all
/// origins, and a deterministic order keeps "lowest first" well-defined
/// across runs.
#[derive(Debug, Default)]
pub struct RumorStore {
    texts: BTreeMap<String, Vec<String>>,
}

impl RumorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally appends a text under `origin`, returning the id it
    /// was assigned. This is the local-origination path; remote rumors go
    /// through [`accept`](Self::accept).
    pub fn append(&mut self, origin: &str, text: &str) -> u32 {
        let log = self.texts.entry(origin.to_string()).or_default();
        log.push(text.to_string());
        log.len() as u32
    }

    /// Offers a remote rumor to the store.
    ///
    /// Only the exact next id for the origin is appended; everything below
    /// is a duplicate and everything above is a gap we refuse to create.
    /// Note that id 0 always classifies as `Duplicate` — ids start at 1.
    pub fn accept(&mut self, rumor: &RumorMessage) -> Acceptance {
        let next = self.next_id(&rumor.origin);
        if rumor.id == next {
            self.append(&rumor.origin, &rumor.text);
            Acceptance::New
        } else if rumor.id < next {
            Acceptance::Duplicate
        } else {
            Acceptance::Future
        }
    }

    /// Lowest id not yet stored for `origin` (1 if the origin is unknown).
    pub fn next_id(&self, origin: &str) -> u32 {
        self.texts.get(origin).map_or(0, Vec::len) as u32 + 1
    }

    /// `true` if the rumor `(origin, id)` is stored.
    pub fn has(&self, origin: &str, id: u32) -> bool {
        id >= 1 && id < self.next_id(origin)
    }

    /// Reconstructs a stored rumor.
    pub fn rumor(&self, origin: &str, id: u32) -> Option<RumorMessage> {
        if id == 0 {
            return None;
        }
        let text = self.texts.get(origin)?.get(id as usize - 1)?;
        Some(RumorMessage {
            origin: origin.to_string(),
            id,
            text: text.clone(),
        })
    }

    /// The local want vector: one entry per known origin, `next_id = len+1`.
    /// Origins we have never stored rumors for are absent.
    pub fn want(&self) -> Vec<PeerStatus> {
        self.texts
            .iter()
            .map(|(origin, log)| PeerStatus {
                identifier: origin.clone(),
                next_id: log.len() as u32 + 1,
            })
            .collect()
    }

    /// Diffs the local store against a remote want vector.
    ///
    /// `to_send` holds every local rumor at or past the remote's next id
    /// (everything, for origins the remote has never heard of), lowest ids
    /// first per origin. `remote_ahead` flags any origin where the remote's
    /// next id is past ours. A remote `nextid` of 0 is treated as 1 — ids
    /// start at 1, so claiming to want id 0 means wanting everything.
    pub fn diff(&self, remote_want: &[PeerStatus]) -> StatusDiff {
        let remote: BTreeMap<&str, u32> = remote_want
            .iter()
            .map(|entry| (entry.identifier.as_str(), entry.next_id.max(1)))
            .collect();

        let mut diff = StatusDiff::default();

        for (origin, log) in &self.texts {
            let remote_next = remote.get(origin.as_str()).copied().unwrap_or(1);
            for id in remote_next..=log.len() as u32 {
                // remote_next past our tail yields an empty range: nothing
                // to send for this origin.
                diff.to_send.push(RumorMessage {
                    origin: origin.clone(),
                    id,
                    text: log[id as usize - 1].clone(),
                });
            }
        }

        diff.remote_ahead = remote
            .iter()
            .any(|(origin, next)| *next > self.next_id(origin));

        diff
    }
}
