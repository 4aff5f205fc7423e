use std::sync::Arc;
use std::time::Duration;

use swarm_common::{Message, Signal, SwarmError};
use tokio::time::Instant;

use crate::{Bus, Inbox, UdpBus, VirtualBus};

fn heartbeat(sender: u8, term: u32) -> Message {
    Signal::Heartbeat {
        sender,
        term,
        leader: true,
    }
    .encode(Instant::now())
}

async fn wait_for(inbox: &Inbox, count: usize) -> Vec<Message> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut received = Vec::new();
    while received.len() < count && Instant::now() < deadline {
        received.extend(inbox.drain());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    received
}

#[test]
fn test_inbox_preserves_receipt_order() {
    let inbox = Inbox::new();
    for term in 1..=3 {
        inbox.push(heartbeat(0, term));
    }

    let terms: Vec<_> = inbox.drain().iter().map(|m| m.decode().term()).collect();
    assert_eq!(terms, vec![Some(1), Some(2), Some(3)]);
    assert!(inbox.is_empty());
}

#[test]
fn test_virtual_broadcast_skips_sender() {
    let bus = VirtualBus::new();
    let inboxes: Vec<_> = (0..3).map(|id| bus.register(id).unwrap()).collect();

    let delivered = bus.broadcast(&heartbeat(1, 1), 1).unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(inboxes[0].len(), 1);
    assert_eq!(inboxes[1].len(), 0);
    assert_eq!(inboxes[2].len(), 1);
}

#[test]
fn test_virtual_register_is_idempotent() {
    let bus = VirtualBus::new();
    let first = bus.register(4).unwrap();
    let second = bus.register(4).unwrap();

    assert!(first.same_queue(&second));
    assert_eq!(bus.members(), vec![4]);
}

#[test]
fn test_virtual_broadcast_with_no_recipients() {
    let bus = VirtualBus::new();
    assert_eq!(bus.broadcast(&heartbeat(0, 1), 0).unwrap(), 0);

    bus.register(0).unwrap();
    assert_eq!(bus.broadcast(&heartbeat(0, 1), 0).unwrap(), 0);
}

#[test]
fn test_virtual_per_sender_order_under_contention() {
    let bus = Arc::new(VirtualBus::new());
    let observer = bus.register(9).unwrap();
    for id in 0..4 {
        bus.register(id).unwrap();
    }

    let senders: Vec<_> = (0..4u8)
        .map(|id| {
            let bus = bus.clone();
            std::thread::spawn(move || {
                for term in 1..=200 {
                    bus.broadcast(&heartbeat(id, term), id).unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let received = observer.drain();
    assert_eq!(received.len(), 800);

    // Each sender's terms must arrive strictly increasing
    let mut last = [0u32; 4];
    for message in received {
        if let Signal::Heartbeat { sender, term, .. } = message.decode() {
            assert!(term > last[sender as usize]);
            last[sender as usize] = term;
        }
    }
    assert_eq!(last, [200; 4]);
}

#[test]
fn test_udp_register_outside_runtime_fails() {
    let bus = UdpBus::new();
    match bus.register(0) {
        Err(SwarmError::Runtime(_)) => {}
        other => panic!("expected runtime error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_udp_broadcast_reaches_peers() {
    let bus = UdpBus::new();
    let a = bus.register(0).unwrap();
    let b = bus.register(1).unwrap();
    let c = bus.register(2).unwrap();

    assert_eq!(bus.broadcast(&heartbeat(0, 3), 0).unwrap(), 2);

    let at_b = wait_for(&b, 1).await;
    let at_c = wait_for(&c, 1).await;
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_c.len(), 1);
    assert_eq!(
        at_b[0].decode(),
        Signal::Heartbeat {
            sender: 0,
            term: 3,
            leader: true
        }
    );
    assert!(a.is_empty());

    bus.shutdown();
}

#[tokio::test]
async fn test_udp_broadcast_right_after_register() {
    let bus = UdpBus::new();
    bus.register(0).unwrap();
    let peer = bus.register(1).unwrap();

    // No reactor turn between binding and the first send
    assert_eq!(bus.broadcast(&heartbeat(0, 1), 0).unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(bus.broadcast(&heartbeat(0, 2), 0).unwrap(), 1);

    let terms: Vec<_> = wait_for(&peer, 2)
        .await
        .iter()
        .map(|m| m.decode().term())
        .collect();
    assert_eq!(terms, vec![Some(1), Some(2)]);

    bus.shutdown();
}

#[tokio::test]
async fn test_udp_unregistered_sender_is_rejected() {
    let bus = UdpBus::new();
    bus.register(0).unwrap();

    match bus.broadcast(&heartbeat(5, 1), 5) {
        Err(SwarmError::NotRegistered(5)) => {}
        other => panic!("expected NotRegistered, got {:?}", other),
    }
}

#[tokio::test]
async fn test_udp_short_datagram_is_padded() {
    let bus = UdpBus::new();
    let inbox = bus.register(0).unwrap();
    let addr = bus.local_addr(0).unwrap();

    let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // Heartbeat code, sender 3, term 1, flag byte missing
    raw.send_to(&[0x01, 0x00, 3, 1], addr).await.unwrap();
    // Runt frame is dropped
    raw.send_to(&[0x01], addr).await.unwrap();

    let received = wait_for(&inbox, 1).await;
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].decode(),
        Signal::Heartbeat {
            sender: 3,
            term: 1,
            leader: false
        }
    );
}
