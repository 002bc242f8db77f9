//! # The Gossiper
//!
//! The node runtime: one UDP socket, a receive loop that decodes and
//! dispatches packets, two periodic tickers (anti-entropy and route
//! rumors), and the public operations the controller calls.
//!
//! ## Task layout
//!
//! ```text
//! run()             — drives the receive loop on the caller's task
//!   ├─ anti-entropy ticker      (spawned)
//!   ├─ route-rumor ticker       (spawned, only if enabled)
//!   ├─ per-monger deadline task (spawned per outbound rumor)
//!   └─ per-callback task        (spawned per delivered message)
//! ```
//!
//! Packet-driven state mutation happens on the receive task, so rumor
//! acceptance is naturally serialized; the tickers only append local
//! rumors, which the store lock serializes against everything else.
//!
//! ## Shutdown
//!
//! `stop()` flips the shutdown watch channel, fires a `stop` sentinel
//! datagram at the node's own address (so a loop blocked in `recv_from`
//! wakes immediately), then waits for the receive loop to acknowledge
//! exit before releasing the socket. Tests that re-bind the same port in
//! quick succession rely on that ordering.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::{MAX_DATAGRAM_SIZE, MONGER_TIMEOUT, STOP_SENTINEL};

use super::monger::{PendingKey, PendingMongers};
use super::packet::{
    GossipPacket, PeerStatus, PrivateMessage, RumorMessage, SimpleMessage, StatusMessage,
};
use super::peers::{PeerError, PeerRegistry};
use super::routing::{RouteEntry, RoutingTable};
use super::rumors::{Acceptance, RumorStore};
use super::watcher::{PacketStream, WatchedPacket, Watcher};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the gossiper API. Everything else — decode failures,
/// lost datagrams, vanished peers — is logged and absorbed.
#[derive(Debug, Error)]
pub enum GossipError {
    /// The UDP socket could not be bound. Fatal at construction.
    #[error("failed to bind gossip socket: {0}")]
    Bind(#[from] io::Error),
    /// The anti-entropy period must be positive.
    #[error("anti-entropy period must be greater than zero")]
    ZeroAntiEntropy,
    /// Some peer strings in `add_addresses` did not resolve.
    #[error(transparent)]
    Peer(#[from] PeerError),
}

/// Callback invoked when a user-visible message is accepted: a non-route
/// rumor, a rewritten simple message, or a delivered private message.
pub type MessageCallback = Arc<dyn Fn(String, GossipPacket) + Send + Sync>;

// ---------------------------------------------------------------------------
// Gossiper
// ---------------------------------------------------------------------------

/// A rumor-mongering gossip node.
///
/// Cheap to clone — clones share the same node. Create with
/// [`new`](Self::new), start with [`run`](Self::run), tear down with
/// [`stop`](Self::stop).
#[derive(Clone)]
pub struct Gossiper {
    inner: Arc<Inner>,
}

struct Inner {
    /// Bound socket address (the real one, after any port-0 resolution).
    addr: SocketAddr,
    /// Runtime-mutable node identifier.
    identifier: RwLock<String>,
    /// Anti-entropy period. Always positive.
    anti_entropy: Duration,
    /// Route-rumor period. Zero disables the ticker.
    route_timer: Duration,
    /// The socket, shared with the receive loop; taken on stop so the port
    /// frees as soon as the loop exits.
    socket: Mutex<Option<Arc<UdpSocket>>>,
    peers: PeerRegistry,
    rumors: Mutex<RumorStore>,
    routes: RwLock<RoutingTable>,
    pending: PendingMongers,
    callback: RwLock<Option<MessageCallback>>,
    watch_in: Arc<Watcher>,
    watch_out: Arc<Watcher>,
    /// Per-node generator. Never a global: tests run many nodes in one
    /// process and their draws must not be coupled.
    rng: Mutex<StdRng>,
    shutdown: watch::Sender<bool>,
    exited: watch::Sender<bool>,
    started: AtomicBool,
}

impl Gossiper {
    /// Binds the UDP socket and assembles a node. The node is inert until
    /// [`run`](Self::run) is called.
    ///
    /// `route_timer` of zero disables route rumors.
    pub async fn new(
        address: &str,
        identifier: &str,
        anti_entropy: Duration,
        route_timer: Duration,
    ) -> Result<Self, GossipError> {
        if anti_entropy.is_zero() {
            return Err(GossipError::ZeroAntiEntropy);
        }

        let socket = UdpSocket::bind(address).await?;
        let addr = socket.local_addr()?;

        let (shutdown, _) = watch::channel(false);
        let (exited, _) = watch::channel(false);

        info!(%addr, identifier, "gossiper created");

        Ok(Self {
            inner: Arc::new(Inner {
                addr,
                identifier: RwLock::new(identifier.to_string()),
                anti_entropy,
                route_timer,
                socket: Mutex::new(Some(Arc::new(socket))),
                peers: PeerRegistry::new(),
                rumors: Mutex::new(RumorStore::new()),
                routes: RwLock::new(RoutingTable::new()),
                pending: PendingMongers::new(),
                callback: RwLock::new(None),
                watch_in: Watcher::new(),
                watch_out: Watcher::new(),
                rng: Mutex::new(StdRng::from_entropy()),
                shutdown,
                exited,
                started: AtomicBool::new(false),
            }),
        })
    }

    /// The bound socket address.
    pub fn address(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Starts the tickers, signals `ready`, then drives the receive loop
    /// until shutdown. Run this on its own task.
    pub async fn run(&self, ready: oneshot::Sender<()>) {
        let inner = Arc::clone(&self.inner);

        if inner.started.swap(true, Ordering::SeqCst) {
            warn!(addr = %inner.addr, "gossiper is already running");
            let _ = ready.send(());
            return;
        }
        if *inner.shutdown.borrow() {
            inner.exited.send_replace(true);
            let _ = ready.send(());
            return;
        }

        tokio::spawn(Inner::anti_entropy_loop(Arc::clone(&inner)));
        if !inner.route_timer.is_zero() {
            tokio::spawn(Inner::route_rumor_loop(Arc::clone(&inner)));
        }

        let _ = ready.send(());
        inner.receive_loop().await;
        inner.exited.send_replace(true);
    }

    /// Stops the node: signals the tickers, wakes the receive loop with the
    /// stop sentinel, waits for it to exit, and releases the socket so the
    /// port can be re-bound immediately.
    pub async fn stop(&self) {
        let inner = &self.inner;
        info!(addr = %inner.addr, "stopping gossiper");

        inner.shutdown.send_replace(true);

        let socket = inner.socket.lock().clone();
        if let Some(socket) = socket {
            if let Err(error) = socket.send_to(STOP_SENTINEL, inner.addr).await {
                debug!(%error, "could not deliver stop sentinel");
            }
        }

        if inner.started.load(Ordering::SeqCst) {
            let mut exited = inner.exited.subscribe();
            while !*exited.borrow_and_update() {
                if exited.changed().await.is_err() {
                    break;
                }
            }
        }

        *inner.socket.lock() = None;
        info!(addr = %inner.addr, "gossiper stopped");
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Broadcasts `text` once to every known peer as a legacy simple
    /// message. No rumor is recorded.
    pub async fn add_simple_message(&self, text: &str) {
        let simple = SimpleMessage {
            origin_peer_name: self.inner.identifier.read().clone(),
            relay_peer_addr: self.inner.addr.to_string(),
            contents: text.to_string(),
        };
        let packet = GossipPacket::from_simple(simple);

        for peer in self.inner.peers.endpoints() {
            self.inner.send_packet(&packet, peer).await;
        }
    }

    /// Appends `text` as a new local rumor and starts mongering it toward
    /// one random peer. Returns the id the rumor was assigned.
    pub async fn add_message(&self, text: &str) -> u32 {
        let origin = self.inner.identifier.read().clone();
        let id = self.inner.rumors.lock().append(&origin, text);
        info!(id, "new local rumor");

        if let Some(peer) = self.inner.random_peer(&[]) {
            let rumor = RumorMessage {
                origin,
                id,
                text: text.to_string(),
            };
            self.inner.monger(rumor, peer).await;
        }
        id
    }

    /// Sends a point-to-point message toward `destination` along the
    /// current routing table. Best effort: no route, no delivery.
    pub async fn add_private_message(
        &self,
        text: &str,
        destination: &str,
        origin: &str,
        hop_limit: u32,
    ) {
        let private = PrivateMessage {
            origin: origin.to_string(),
            id: 0,
            text: text.to_string(),
            destination: destination.to_string(),
            hop_limit,
        };
        // Goes through the same path as a received private packet, so
        // sending to ourselves delivers locally and sending elsewhere
        // consumes one hop.
        self.inner.handle_private(private, self.inner.addr).await;
    }

    /// Registers peer addresses. Unresolvable strings are skipped and
    /// reported; the rest are added.
    pub fn add_addresses<S: AsRef<str>>(&self, addresses: &[S]) -> Result<(), GossipError> {
        Ok(self.inner.peers.add_many(addresses)?)
    }

    /// Known peers, textual form, insertion order.
    pub fn get_nodes(&self) -> Vec<String> {
        self.inner.peers.snapshot()
    }

    /// Origins we currently hold a route for.
    pub fn get_direct_nodes(&self) -> Vec<String> {
        self.inner.routes.read().direct_nodes()
    }

    /// Snapshot of the routing table.
    pub fn get_routing_table(&self) -> HashMap<String, RouteEntry> {
        self.inner.routes.read().snapshot()
    }

    /// Current node identifier.
    pub fn get_identifier(&self) -> String {
        self.inner.identifier.read().clone()
    }

    /// Replaces the node identifier. Takes effect for every subsequent
    /// origination; already-stored rumors keep their origin.
    pub fn set_identifier(&self, identifier: &str) {
        *self.inner.identifier.write() = identifier.to_string();
    }

    /// The current want vector (diagnostic view of the rumor store).
    pub fn want(&self) -> Vec<PeerStatus> {
        self.inner.rumors.lock().want()
    }

    /// Installs the user-message callback. Single slot: a second call
    /// replaces the first.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(String, GossipPacket) + Send + Sync + 'static,
    {
        *self.inner.callback.write() = Some(Arc::new(callback));
    }

    /// Subscribes to packet events: inbound decoded packets when
    /// `incoming`, successfully sent packets otherwise.
    pub fn watch(&self, incoming: bool) -> PacketStream {
        if incoming {
            self.inner.watch_in.subscribe()
        } else {
            self.inner.watch_out.subscribe()
        }
    }
}

// ---------------------------------------------------------------------------
// Receive loop & handlers
// ---------------------------------------------------------------------------

impl Inner {
    async fn receive_loop(self: &Arc<Self>) {
        let socket = self.socket.lock().clone();
        let Some(socket) = socket else {
            return;
        };

        let mut shutdown = self.shutdown.subscribe();
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        info!(addr = %self.addr, "receive loop started");
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => {
                        if &buf[..len] == STOP_SENTINEL && src == self.addr {
                            debug!("stop sentinel received");
                            break;
                        }
                        match GossipPacket::decode(&buf[..len]) {
                            Ok(packet) => self.dispatch(packet, src).await,
                            Err(error) => {
                                debug!(%src, %error, "dropping undecodable datagram");
                            }
                        }
                    }
                    Err(error) => {
                        if *shutdown.borrow() {
                            break;
                        }
                        warn!(%error, "udp receive failed");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        info!(addr = %self.addr, "receive loop exited");
    }

    async fn dispatch(self: &Arc<Self>, packet: GossipPacket, src: SocketAddr) {
        trace!(%src, kind = packet.kind(), "packet received");

        if let Some(simple) = &packet.simple {
            self.handle_simple(simple.clone(), src).await;
        } else if let Some(rumor) = &packet.rumor {
            self.handle_rumor(rumor.clone(), src).await;
        } else if let Some(status) = &packet.status {
            self.handle_status(status.clone(), src).await;
        } else if let Some(private) = &packet.private {
            self.handle_private(private.clone(), src).await;
        }

        // Observers see the packet only once its effects are committed.
        self.watch_in.notify(WatchedPacket {
            addr: src.to_string(),
            packet,
        });
    }

    /// Legacy broadcast flooding: learn the sender, stamp ourselves as the
    /// relay, pass it on to everyone except where it came from.
    async fn handle_simple(self: &Arc<Self>, simple: SimpleMessage, src: SocketAddr) {
        self.peers.add(src);

        let exclude: SocketAddr = simple.relay_peer_addr.parse().unwrap_or(src);
        let rewritten = SimpleMessage {
            relay_peer_addr: self.addr.to_string(),
            ..simple
        };
        let packet = GossipPacket::from_simple(rewritten.clone());

        for peer in self.peers.endpoints() {
            if peer != exclude {
                self.send_packet(&packet, peer).await;
            }
        }

        self.fire_callback(rewritten.origin_peer_name, packet);
    }

    /// Rumor mongering: accept if it is the next id, ack with our want
    /// vector either way, and pass fresh rumors on to one random peer.
    async fn handle_rumor(self: &Arc<Self>, rumor: RumorMessage, src: SocketAddr) {
        self.peers.add(src);

        let acceptance = self.rumors.lock().accept(&rumor);
        debug!(
            origin = %rumor.origin,
            id = rumor.id,
            %src,
            ?acceptance,
            "rumor received"
        );

        if acceptance == Acceptance::New {
            let local = self.identifier.read().clone();
            if rumor.origin != local {
                self.routes
                    .write()
                    .observe(&rumor.origin, rumor.id, src, rumor.is_route());
            }
            if !rumor.is_route() {
                self.fire_callback(rumor.origin.clone(), GossipPacket::from_rumor(rumor.clone()));
            }
        }

        // Ack reflects the post-append store.
        self.send_status(src).await;

        if acceptance == Acceptance::New {
            if let Some(peer) = self.random_peer(&[src]) {
                self.monger(rumor, peer).await;
            }
        }
    }

    /// Status reconciliation: ship the lowest rumor the peer is missing,
    /// or ask for what they have and we don't, or — if the views match —
    /// settle acknowledged mongers with a coin flip.
    async fn handle_status(self: &Arc<Self>, status: StatusMessage, src: SocketAddr) {
        self.peers.add(src);

        // Anything this status acknowledges is settled now, whatever
        // branch we take below.
        let cleared = self.pending.acked(src, &status.want);
        let diff = self.rumors.lock().diff(&status.want);

        if let Some(rumor) = diff.to_send.into_iter().next() {
            debug!(
                %src,
                origin = %rumor.origin,
                id = rumor.id,
                "peer is behind, sending rumor"
            );
            self.send_packet(&GossipPacket::from_rumor(rumor), src).await;
        } else if diff.remote_ahead {
            debug!(%src, "peer is ahead, answering with our status");
            self.send_status(src).await;
        } else {
            for key in cleared {
                if !self.rng.lock().gen_bool(0.5) {
                    debug!(origin = %key.origin, id = key.id, "coin flip tails, rumor rests");
                    continue;
                }
                let Some(peer) = self.random_peer(&[src]) else {
                    continue;
                };
                let rumor = self.rumors.lock().rumor(&key.origin, key.id);
                let Some(rumor) = rumor else {
                    continue;
                };
                debug!(
                    origin = %rumor.origin,
                    id = rumor.id,
                    %peer,
                    "coin flip heads, mongering on"
                );
                self.monger(rumor, peer).await;
            }
        }
    }

    /// Point-to-point forwarding. Deliver if we are the destination,
    /// otherwise spend a hop and relay along the routing table.
    async fn handle_private(self: &Arc<Self>, private: PrivateMessage, _src: SocketAddr) {
        let local = self.identifier.read().clone();

        if private.destination == local {
            debug!(origin = %private.origin, "private message delivered");
            self.fire_callback(private.origin.clone(), GossipPacket::from_private(private));
            return;
        }

        if private.hop_limit <= 1 {
            debug!(
                destination = %private.destination,
                "hop limit exhausted, dropping private message"
            );
            return;
        }

        let next_hop = self.routes.read().next_hop(&private.destination);
        match next_hop {
            Some(hop) => {
                let forwarded = PrivateMessage {
                    hop_limit: private.hop_limit - 1,
                    ..private
                };
                self.send_packet(&GossipPacket::from_private(forwarded), hop)
                    .await;
            }
            None => {
                debug!(
                    destination = %private.destination,
                    "no route for private message, dropping"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tickers
    // -----------------------------------------------------------------------

    async fn anti_entropy_loop(inner: Arc<Self>) {
        let mut shutdown = inner.shutdown.subscribe();
        let mut ticker = tokio::time::interval(inner.anti_entropy);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // the immediate first tick; real ones follow

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(peer) = inner.random_peer(&[]) else {
                        continue;
                    };
                    trace!(%peer, "anti-entropy tick");
                    inner.send_status(peer).await;
                }
                _ = shutdown.changed() => {
                    debug!("anti-entropy ticker stopped");
                    return;
                }
            }
        }
    }

    async fn route_rumor_loop(inner: Arc<Self>) {
        let mut shutdown = inner.shutdown.subscribe();

        // One immediately at startup so neighbors learn a return path
        // before the first period elapses.
        inner.originate_route_rumor().await;

        let mut ticker = tokio::time::interval(inner.route_timer);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => inner.originate_route_rumor().await,
                _ = shutdown.changed() => {
                    debug!("route-rumor ticker stopped");
                    return;
                }
            }
        }
    }

    async fn originate_route_rumor(self: &Arc<Self>) {
        let origin = self.identifier.read().clone();
        let id = self.rumors.lock().append(&origin, "");
        trace!(id, "originating route rumor");

        if let Some(peer) = self.random_peer(&[]) {
            let rumor = RumorMessage {
                origin,
                id,
                text: String::new(),
            };
            self.monger(rumor, peer).await;
        }
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Sends a rumor expecting an ack: records the pending entry, arms its
    /// deadline, then fires the datagram.
    async fn monger(self: &Arc<Self>, rumor: RumorMessage, to: SocketAddr) {
        let key = PendingKey {
            origin: rumor.origin.clone(),
            id: rumor.id,
            peer: to,
        };
        let generation = self.pending.begin(key.clone());

        let inner = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(MONGER_TIMEOUT) => {
                    if inner.pending.expire(&key, generation) {
                        debug!(
                            origin = %key.origin,
                            id = key.id,
                            peer = %key.peer,
                            "mongering deadline expired, abandoning rumor"
                        );
                    }
                }
                _ = shutdown.changed() => {}
            }
        });

        self.send_packet(&GossipPacket::from_rumor(rumor), to).await;
    }

    async fn send_status(self: &Arc<Self>, to: SocketAddr) {
        let want = self.rumors.lock().want();
        self.send_packet(&GossipPacket::from_status(StatusMessage { want }), to)
            .await;
    }

    /// Encodes and fires one datagram. Send failures are logged, never
    /// propagated — the peer may simply be gone, and anti-entropy will
    /// re-engage if it comes back.
    async fn send_packet(&self, packet: &GossipPacket, dest: SocketAddr) {
        let socket = self.socket.lock().clone();
        let Some(socket) = socket else {
            debug!(%dest, "socket released, dropping outbound packet");
            return;
        };

        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to encode outbound packet");
                return;
            }
        };

        match socket.send_to(&bytes, dest).await {
            Ok(_) => {
                trace!(%dest, kind = packet.kind(), "packet sent");
                self.watch_out.notify(WatchedPacket {
                    addr: dest.to_string(),
                    packet: packet.clone(),
                });
            }
            Err(error) => warn!(%dest, %error, "udp send failed"),
        }
    }

    fn random_peer(&self, exclude: &[SocketAddr]) -> Option<SocketAddr> {
        self.peers.random(&mut *self.rng.lock(), exclude)
    }

    /// Invokes the user callback off the receive task. The callback may be
    /// arbitrarily slow; the loop must not care.
    fn fire_callback(&self, origin: String, packet: GossipPacket) {
        let callback = self.callback.read().clone();
        let Some(callback) = callback else {
            return;
        };
        tokio::spawn(async move {
            callback(origin, packet);
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
