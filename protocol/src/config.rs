//! # Protocol Configuration & Constants
//!
//! Every magic number in Murmur lives here. A constant hardcoded anywhere
//! else is a bug report waiting to be filed.
//!
//! Most of these are wire-visible or timing-sensitive: changing them on a
//! live overlay means old and new nodes disagree about datagram sizes and
//! reconciliation cadence, so bump them deliberately.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Wire Format
// ---------------------------------------------------------------------------

/// Receive MTU for gossip datagrams. UDP truncates anything larger, and a
/// truncated JSON body fails decode — which the receive loop treats as a
/// drop. Senders must keep packets under this bound.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Payload of the shutdown sentinel datagram. A datagram carrying exactly
/// these bytes, arriving from the node's own address, tells the receive
/// loop to exit.
pub const STOP_SENTINEL: &[u8] = b"stop";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Default anti-entropy period. Every tick, the node pushes its want vector
/// to one random peer. Rumor mongering gets messages out fast; anti-entropy
/// guarantees they get everywhere eventually.
pub const DEFAULT_ANTI_ENTROPY: Duration = Duration::from_secs(10);

/// How long a mongered rumor waits for an acknowledging status before the
/// node abandons propagation on that peer. Expiry is an implicit "tails":
/// no retry, anti-entropy picks up the slack.
pub const MONGER_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

/// Default hop limit for private messages. Loop prevention for
/// point-to-point forwarding relies entirely on this budget — private
/// messages are never stored or deduplicated.
pub const DEFAULT_HOP_LIMIT: u32 = 10;

// ---------------------------------------------------------------------------
// Watchers
// ---------------------------------------------------------------------------

/// Queue depth at which a packet watcher starts logging warnings. The queue
/// itself is unbounded; a consumer that stops draining will show up in the
/// logs long before it shows up in the heap profile.
pub const WATCHER_DEPTH_WARNING: usize = 1000;

// ---------------------------------------------------------------------------
// Network Defaults
// ---------------------------------------------------------------------------

/// Default UI (controller) port for exchanging messages with the user
/// interface.
pub const DEFAULT_UI_PORT: u16 = 8080;

/// Default gossip bind address for the node binary.
pub const DEFAULT_GOSSIP_ADDR: &str = "127.0.0.1:5000";
