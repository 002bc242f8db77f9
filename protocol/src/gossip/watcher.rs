//! # Packet Watchers
//!
//! Observer fan-out for packet events. The gossiper keeps two watchers —
//! one fed after every inbound packet commits, one after every successful
//! outbound send — and tests or a UI subscribe to either.
//!
//! Each subscription is an unbounded queue with a depth gauge: a consumer
//! that stops draining does not stall the dispatch path, it just earns
//! warnings in the log. Dropping the stream unsubscribes; anything still
//! queued can be drained before the stream reports end-of-stream.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::WATCHER_DEPTH_WARNING;

use super::packet::GossipPacket;

/// One observed packet event: the counterparty address (source for inbound,
/// destination for outbound) and the packet itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedPacket {
    /// Textual form of the counterparty endpoint.
    pub addr: String,
    /// The decoded (inbound) or sent (outbound) packet.
    pub packet: GossipPacket,
}

struct Observer {
    tx: mpsc::UnboundedSender<WatchedPacket>,
    depth: Arc<AtomicUsize>,
}

/// Fan-out registry of packet observers.
#[derive(Default)]
pub struct Watcher {
    observers: Mutex<HashMap<u64, Observer>>,
    next_id: AtomicU64,
}

impl Watcher {
    /// Creates an empty watcher behind the `Arc` that subscriptions weakly
    /// reference for removal on drop.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new observer and returns its packet stream.
    pub fn subscribe(self: &Arc<Self>) -> PacketStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.observers.lock().insert(
            id,
            Observer {
                tx,
                depth: Arc::clone(&depth),
            },
        );

        PacketStream {
            id,
            rx,
            depth,
            watcher: Arc::downgrade(self),
        }
    }

    /// Delivers one event to every live observer, in registration order of
    /// nothing in particular — observers are independent queues. Observers
    /// whose stream has been dropped are pruned here.
    pub fn notify(&self, event: WatchedPacket) {
        let mut observers = self.observers.lock();
        let mut dead = Vec::new();

        for (id, observer) in observers.iter() {
            if observer.tx.send(event.clone()).is_err() {
                dead.push(*id);
                continue;
            }
            let depth = observer.depth.fetch_add(1, Ordering::Relaxed) + 1;
            if depth > WATCHER_DEPTH_WARNING {
                warn!(queued = depth, "packet watcher queue is not being drained");
            }
        }

        for id in dead {
            observers.remove(&id);
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn remove(&self, id: u64) {
        self.observers.lock().remove(&id);
    }
}

/// A subscription handle. Implements [`futures::Stream`]; dropping it
/// unsubscribes and closes the queue.
pub struct PacketStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<WatchedPacket>,
    depth: Arc<AtomicUsize>,
    watcher: Weak<Watcher>,
}

impl PacketStream {
    /// Receives the next event, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<WatchedPacket> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        event
    }
}

impl Stream for PacketStream {
    type Item = WatchedPacket;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = polled {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        polled
    }
}

impl Drop for PacketStream {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.upgrade() {
            watcher.remove(self.id);
        }
    }
}
