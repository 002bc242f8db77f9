//! End-to-end tests for the Murmur gossiper.
//!
//! These run real nodes on real UDP sockets bound to ephemeral localhost
//! ports and exercise the full protocol: rumor mongering, status acks,
//! anti-entropy repair, partition healing, DSDV route learning, private
//! forwarding, and legacy simple-mode flooding.
//!
//! Each test stands alone with its own set of nodes. Timings follow the
//! protocol periods involved, with generous deadlines so scheduler jitter
//! does not produce flakes.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use murmur_protocol::gossip::PacketStream;
use murmur_protocol::{GossipPacket, Gossiper, PeerStatus, WatchedPacket};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// A long period for tickers a test wants effectively disabled.
const NEVER: Duration = Duration::from_secs(1000);

async fn create_node(name: &str, anti_entropy: Duration, route_timer: Duration) -> Gossiper {
    let node = Gossiper::new("127.0.0.1:0", name, anti_entropy, route_timer)
        .await
        .expect("bind node");
    assert_eq!(node.get_identifier(), name);
    assert!(node.get_nodes().is_empty());
    node
}

/// Runs the node on its own task and waits until it is ready.
async fn start(node: &Gossiper) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let runner = node.clone();
    tokio::spawn(async move { runner.run(ready_tx).await });
    ready_rx.await.expect("node ready");
}

/// Points `from` at `to`'s gossip address.
fn link(from: &Gossiper, to: &Gossiper) {
    from.add_addresses(&[to.address().to_string()])
        .expect("add peer");
}

/// Streams callback deliveries into a channel the test can drain.
fn deliveries(node: &Gossiper) -> mpsc::UnboundedReceiver<(String, GossipPacket)> {
    let (tx, rx) = mpsc::unbounded_channel();
    node.register_callback(move |origin, packet| {
        let _ = tx.send((origin, packet));
    });
    rx
}

/// Waits for the next rumor event on a watch stream.
async fn next_rumor(stream: &mut PacketStream, deadline: Duration) -> WatchedPacket {
    timeout(deadline, async {
        loop {
            let event = stream.recv().await.expect("watch stream closed");
            if event.packet.rumor.is_some() {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a rumor")
}

/// Waits for the next status event on a watch stream.
async fn next_status(stream: &mut PacketStream, deadline: Duration) -> WatchedPacket {
    timeout(deadline, async {
        loop {
            let event = stream.recv().await.expect("watch stream closed");
            if event.packet.status.is_some() {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a status")
}

fn want_entry(identifier: &str, next_id: u32) -> PeerStatus {
    PeerStatus {
        identifier: identifier.to_string(),
        next_id,
    }
}

// ---------------------------------------------------------------------------
// 1. Two nodes: a rumor is delivered and both stores agree
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_nodes_rumor_delivery() {
    let a = create_node("A", NEVER, Duration::ZERO).await;
    let b = create_node("B", NEVER, Duration::ZERO).await;
    link(&a, &b);
    link(&b, &a);

    let mut out_a = a.watch(false);
    let mut in_b = b.watch(true);
    let mut delivered_b = deliveries(&b);

    start(&a).await;
    start(&b).await;

    a.add_message("From A to B, with love").await;

    // A mongered the rumor toward B...
    let sent = next_rumor(&mut out_a, Duration::from_secs(3)).await;
    assert_eq!(sent.addr, b.address().to_string());
    assert_eq!(sent.packet.rumor.as_ref().unwrap().text, "From A to B, with love");

    // ...B saw it arrive from A...
    let received = next_rumor(&mut in_b, Duration::from_secs(3)).await;
    assert_eq!(received.addr, a.address().to_string());

    // ...and B's callback fired with the full rumor.
    let (origin, packet) = timeout(Duration::from_secs(3), delivered_b.recv())
        .await
        .expect("callback deadline")
        .expect("callback channel");
    let rumor = packet.rumor.expect("callback carries the rumor");
    assert_eq!(origin, "A");
    assert_eq!(rumor.origin, "A");
    assert_eq!(rumor.id, 1);
    assert_eq!(rumor.text, "From A to B, with love");

    // Both want vectors now ask for A's next rumor.
    assert_eq!(a.want(), vec![want_entry("A", 2)]);
    assert_eq!(b.want(), vec![want_entry("A", 2)]);

    a.stop().await;
    b.stop().await;
}

// ---------------------------------------------------------------------------
// 2. The receiver acks a mongered rumor with a covering status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rumor_is_acked_with_status() {
    let a = create_node("A", NEVER, Duration::ZERO).await;
    let b = create_node("B", NEVER, Duration::ZERO).await;
    link(&a, &b);
    link(&b, &a);

    let mut out_b = b.watch(false);
    let mut in_a = a.watch(true);

    start(&a).await;
    start(&b).await;

    a.add_message("From A to B, with love").await;

    let expected_want = vec![want_entry("A", 2)];

    // B answered the rumor with a status covering it...
    let ack = next_status(&mut out_b, Duration::from_secs(3)).await;
    assert_eq!(ack.addr, a.address().to_string());
    assert_eq!(ack.packet.status.unwrap().want, expected_want);

    // ...and A observed that ack arriving.
    let seen = next_status(&mut in_a, Duration::from_secs(3)).await;
    assert_eq!(seen.packet.status.unwrap().want, expected_want);

    a.stop().await;
    b.stop().await;
}

// ---------------------------------------------------------------------------
// 3. Anti-entropy ticks at the configured period
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anti_entropy_periodicity() {
    let a = create_node("A", Duration::from_secs(1), Duration::ZERO).await;
    let b = create_node("B", Duration::from_secs(1), Duration::ZERO).await;
    link(&a, &b);
    link(&b, &a);

    let mut in_b = b.watch(true);

    start(&a).await;
    start(&b).await;

    // Count statuses reaching B over a 5 second window. With a 1 second
    // period and no user traffic, that is one per tick give or take
    // scheduler jitter.
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    let mut statuses = 0;
    loop {
        tokio::select! {
            event = in_b.recv() => {
                if event.expect("watch stream closed").packet.status.is_some() {
                    statuses += 1;
                }
            }
            _ = &mut deadline => break,
        }
    }

    assert!(
        (4..=7).contains(&statuses),
        "expected 4..=7 status packets in 5s, got {statuses}"
    );

    a.stop().await;
    b.stop().await;
}

// ---------------------------------------------------------------------------
// 4. Three-node chain: the middle node's rumor reaches both ends once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_node_chain_converges() {
    let a = create_node("A", Duration::from_secs(1), Duration::ZERO).await;
    let b = create_node("B", Duration::from_secs(1), Duration::ZERO).await;
    let c = create_node("C", Duration::from_secs(1), Duration::ZERO).await;

    // A -> B -> C: A can reach B, B can reach C. Everything else must be
    // learned from sender addresses.
    link(&a, &b);
    link(&b, &c);

    let mut delivered_a = deliveries(&a);
    let mut delivered_c = deliveries(&c);

    start(&a).await;
    start(&b).await;
    start(&c).await;

    b.add_message("hi").await;

    // Collect deliveries for the whole window, then assert exactly one
    // notification each — duplicates would show up here.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let mut a_count = 0;
    while let Ok((origin, packet)) = delivered_a.try_recv() {
        assert_eq!(origin, "B");
        assert_eq!(packet.rumor.unwrap().text, "hi");
        a_count += 1;
    }
    let mut c_count = 0;
    while let Ok((origin, packet)) = delivered_c.try_recv() {
        assert_eq!(origin, "B");
        assert_eq!(packet.rumor.unwrap().text, "hi");
        c_count += 1;
    }
    assert_eq!(a_count, 1, "A must see the rumor exactly once");
    assert_eq!(c_count, 1, "C must see the rumor exactly once");

    // B learned A and C as senders.
    let nodes = b.get_nodes();
    assert!(nodes.contains(&a.address().to_string()));
    assert!(nodes.contains(&c.address().to_string()));

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

// ---------------------------------------------------------------------------
// 5. Partition heals: a late joiner and an isolated writer reconcile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partition_heals_after_reconnect() {
    const MSG_COUNT: usize = 5;

    let a = create_node("A", Duration::from_secs(1), Duration::ZERO).await;
    let b = create_node("B", Duration::from_secs(1), Duration::ZERO).await;
    let c = create_node("C", Duration::from_secs(5), Duration::ZERO).await;

    // Ring: A -> B -> C -> A. B stays down for the first half of the test,
    // so A's rumors initially fall on deaf ears.
    link(&a, &b);
    link(&b, &c);
    link(&c, &a);

    let mut delivered_a = deliveries(&a);
    let mut delivered_b = deliveries(&b);

    start(&a).await;
    start(&c).await;

    for _ in 0..MSG_COUNT {
        a.add_message("I believe I can fly!").await;
    }

    // B joins late and publishes its own batch.
    tokio::time::sleep(Duration::from_secs(5)).await;
    start(&b).await;
    for _ in 0..MSG_COUNT {
        b.add_message("I believe I can touch the sky!").await;
    }

    // Let anti-entropy drag everything everywhere.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let mut a_got = 0;
    while let Ok((origin, packet)) = delivered_a.try_recv() {
        assert_eq!(origin, "B");
        assert_eq!(
            packet.rumor.unwrap().text,
            "I believe I can touch the sky!"
        );
        a_got += 1;
    }
    let mut b_got = 0;
    while let Ok((origin, packet)) = delivered_b.try_recv() {
        assert_eq!(origin, "A");
        assert_eq!(packet.rumor.unwrap().text, "I believe I can fly!");
        b_got += 1;
    }

    // Exactly one delivery per rumor: full exchange, no duplicates.
    assert_eq!(a_got, MSG_COUNT);
    assert_eq!(b_got, MSG_COUNT);

    // Stores are contiguous and complete on every node.
    for node in [&a, &b, &c] {
        let want = node.want();
        assert!(want.contains(&want_entry("A", MSG_COUNT as u32 + 1)));
        assert!(want.contains(&want_entry("B", MSG_COUNT as u32 + 1)));
    }

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

// ---------------------------------------------------------------------------
// 6. DSDV: next hops point along the physical topology
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dsdv_routes_follow_topology() {
    let anti = Duration::from_secs(1);
    let route_timer = Duration::from_secs(100); // startup route rumor only

    let a = create_node("A", anti, route_timer).await;
    let b = create_node("B", anti, route_timer).await;
    let c = create_node("C", anti, route_timer).await;
    let d = create_node("D", anti, route_timer).await;
    let e = create_node("E", anti, route_timer).await;

    // A <-> B, A <-> C, B <-> D, B <-> E.
    link(&a, &b);
    link(&a, &c);
    link(&b, &d);
    link(&b, &e);
    link(&c, &a);
    link(&d, &b);
    link(&e, &b);

    for node in [&a, &b, &c, &d, &e] {
        start(node).await;
    }
    for node in [&a, &b, &c, &d, &e] {
        node.add_message("I am alive!").await;
    }

    tokio::time::sleep(Duration::from_secs(5)).await;

    // Direct neighbors are reached directly...
    let routes_a = a.get_routing_table();
    assert_eq!(routes_a["B"].next_hop, b.address());
    assert_eq!(routes_a["C"].next_hop, c.address());
    // ...and D sits behind B from A's point of view.
    assert_eq!(routes_a["D"].next_hop, b.address());

    // B reaches C only through A.
    let routes_b = b.get_routing_table();
    assert_eq!(routes_b["C"].next_hop, a.address());

    let routes_d = d.get_routing_table();
    assert_eq!(routes_d["B"].next_hop, b.address());

    for node in [&a, &b, &c, &d, &e] {
        node.stop().await;
    }
}

// ---------------------------------------------------------------------------
// 7. Private messages ride the routing table across hops
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_message_crosses_the_overlay() {
    let anti = Duration::from_secs(1);
    let route_timer = Duration::from_secs(1);

    let a = create_node("A", anti, route_timer).await;
    let b = create_node("B", anti, route_timer).await;
    let c = create_node("C", anti, route_timer).await;

    // A <-> B <-> C. A and C are not adjacent.
    link(&a, &b);
    link(&b, &a);
    link(&b, &c);
    link(&c, &b);

    let mut delivered_c = deliveries(&c);

    start(&a).await;
    start(&b).await;
    start(&c).await;

    // Give route rumors a moment to teach A a path to C.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(a.get_routing_table().contains_key("C"), "A needs a route to C");

    a.add_private_message("between us", "C", "A", 10).await;

    let (origin, packet) = timeout(Duration::from_secs(3), delivered_c.recv())
        .await
        .expect("private delivery deadline")
        .expect("callback channel");
    let private = packet.private.expect("callback carries the private message");
    assert_eq!(origin, "A");
    assert_eq!(private.text, "between us");
    assert_eq!(private.destination, "C");
    // Two hops were spent: A's origination and B's relay.
    assert_eq!(private.hop_limit, 8);

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

// ---------------------------------------------------------------------------
// 8. Simple mode floods a chain, rewriting the relay at each hop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simple_mode_floods_a_chain() {
    let g1 = create_node("g1", NEVER, Duration::ZERO).await;
    let g2 = create_node("g2", NEVER, Duration::ZERO).await;
    let g3 = create_node("g3", NEVER, Duration::ZERO).await;

    // g1 -> g2 -> g3.
    link(&g1, &g2);
    link(&g2, &g3);

    let mut delivered_g2 = deliveries(&g2);
    let mut delivered_g3 = deliveries(&g3);

    start(&g1).await;
    start(&g2).await;
    start(&g3).await;

    g1.add_simple_message("message1").await;

    let (origin, packet) = timeout(Duration::from_secs(3), delivered_g2.recv())
        .await
        .expect("g2 delivery deadline")
        .expect("callback channel");
    let simple = packet.simple.expect("simple message");
    assert_eq!(origin, "g1");
    assert_eq!(simple.origin_peer_name, "g1");
    assert_eq!(simple.contents, "message1");
    // g2 rewrote the relay to itself before flooding on.
    assert_eq!(simple.relay_peer_addr, g2.address().to_string());

    let (_, packet) = timeout(Duration::from_secs(3), delivered_g3.recv())
        .await
        .expect("g3 delivery deadline")
        .expect("callback channel");
    assert_eq!(
        packet.simple.unwrap().relay_peer_addr,
        g3.address().to_string()
    );

    // Relaying taught g2 and g3 who sent to them.
    assert!(g2.get_nodes().contains(&g1.address().to_string()));
    assert!(g3.get_nodes().contains(&g2.address().to_string()));

    g1.stop().await;
    g2.stop().await;
    g3.stop().await;
}
