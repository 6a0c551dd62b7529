// SYN/ACK exchange tests over the in-memory transport

use crate::common::{addr, key, ok_state, RecordingTransport, TestNode};
use chrono::{Duration, Utc};
use peergossip::membership::{Peer, SeedPeer};
use peergossip::sync::{
    encode_peers, ExchangeState, GossipConfig, GossipTarget, PeerRecord, SynRequest,
};
use peergossip::transport::RequestHandler;
use std::sync::Arc;

async fn pair(transport: &RecordingTransport) -> (TestNode, TestNode) {
    let a = TestNode::new(1, Arc::new(transport.clone()), GossipConfig::default());
    let b = TestNode::new(2, Arc::new(transport.clone()), GossipConfig::default());
    transport.inner.register(addr(1), a.engine.clone()).await;
    transport.inner.register(addr(2), b.engine.clone()).await;
    (a, b)
}

// ============================================================================
// FULL EXCHANGE
// ============================================================================

#[tokio::test]
async fn test_two_nodes_learn_each_other() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;
    a.seed(2).await;

    let report = a.scheduler.run_round().await.unwrap();

    assert_eq!(report.targets, vec![addr(2)]);
    assert_eq!(report.exchanges.len(), 1);
    assert_eq!(report.exchanges[0].state, ExchangeState::Done);

    // SYN carries only A's own, freshly refreshed record
    let syns = transport.syns.lock().unwrap().clone();
    assert_eq!(syns.len(), 1);
    let syn = &syns[0].1;
    assert_eq!(syn.known_peers.len(), 1);
    assert_eq!(syn.known_peers[0].key(), key(1));
    assert!(syn.receiver.public_key.is_empty());

    // B taught A about itself and asked for detail on A
    assert_eq!(a.keys().await, vec![key(1), key(2)]);
    assert_eq!(report.exchanges[0].learned.inserted, vec![key(2)]);
    assert_eq!(report.exchanges[0].requested, 1);

    // A was discovered after its refresh, so the ACK carried it
    let acks = transport.acks.lock().unwrap().clone();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].1.requested_peers.len(), 1);
    assert_eq!(acks[0].1.requested_peers[0].key(), key(1));
    assert_eq!(acks[0].1.receiver.key(), key(2));

    assert_eq!(b.keys().await, vec![key(2), key(1)]);
    assert_eq!(a.notifier.notified(), vec![key(2)]);
    assert_eq!(b.notifier.notified(), vec![key(1)]);
}

#[tokio::test]
async fn test_undiscovered_peers_not_sent_in_ack() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;

    // No refresh: A is still bootstrapping
    let target = GossipTarget::seed(&SeedPeer::new(addr(2)));
    let report = a.engine.exchange(&target).await.unwrap();

    assert_eq!(report.requested, 1);
    assert_eq!(report.sent_detail, 0);
    assert_eq!(report.state, ExchangeState::Done);
    assert_eq!(transport.inner.ack_calls(), 0);
    assert_eq!(b.keys().await, vec![key(2)]);
    // A still learned B from the SynAck
    assert!(a.registry.contains_peer(&key(2)).await.is_some());
}

#[tokio::test]
async fn test_repeated_exchange_is_stable() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;
    a.seed(2).await;

    a.scheduler.run_round().await.unwrap();
    a.scheduler.run_round().await.unwrap();

    assert_eq!(a.registry.len().await, 2);
    assert_eq!(b.registry.len().await, 2);
    assert_eq!(a.notifier.notified(), vec![key(2)]);
    assert_eq!(b.notifier.notified(), vec![key(1)]);
}

#[tokio::test]
async fn test_unreachable_target_fails_exchange() {
    let transport = RecordingTransport::default();
    let (a, _b) = pair(&transport).await;
    transport.inner.set_unreachable(addr(2), true).await;

    let target = GossipTarget::seed(&SeedPeer::new(addr(2)));
    let result = a.engine.exchange(&target).await;

    assert!(result.is_err());
    assert_eq!(a.registry.len().await, 1);
}

// ============================================================================
// RECEIVER SIDE
// ============================================================================

#[tokio::test]
async fn test_syn_refreshes_stale_known_peer() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;
    let now = Utc::now();

    let stale = Peer::new(key(3), addr(3))
        .with_state(ok_state())
        .with_generation_time(now - Duration::seconds(60));
    let fresh = Peer::new(key(3), addr(3))
        .with_state(ok_state())
        .with_generation_time(now - Duration::seconds(1));
    b.registry.insert_peer(stale).await.unwrap();
    a.registry.insert_peer(fresh.clone()).await.unwrap();

    let target = GossipTarget::seed(&SeedPeer::new(addr(2)));
    let report = a.engine.exchange(&target).await.unwrap();

    // Only A itself is unknown to B; C was refreshed in place
    assert_eq!(report.requested, 1);
    let stored = b.registry.contains_peer(&key(3)).await.unwrap();
    assert_eq!(
        stored.generation_time().timestamp(),
        fresh.generation_time().timestamp()
    );
    assert!(b.notifier.notified().is_empty());
}

#[tokio::test]
async fn test_syn_does_not_insert_unknown_peers() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;
    a.registry
        .insert_peer(Peer::new(key(3), addr(3)).with_state(ok_state()))
        .await
        .unwrap();

    let request = SynRequest {
        initiator: PeerRecord::from(&a.registry.owned_peer().await),
        receiver: PeerRecord::stub(addr(2)),
        known_peers: encode_peers(&a.registry.list_peers().await),
    };
    let syn_ack = b.engine.synchronize(request).await;

    let unknown: Vec<_> = syn_ack.unknown_peers.iter().map(|r| r.key()).collect();
    assert_eq!(unknown, vec![key(1), key(3)]);
    assert_eq!(syn_ack.new_peers.len(), 1);
    assert_eq!(syn_ack.new_peers[0].key(), key(2));
    assert_eq!(syn_ack.receiver.key(), key(2));
    assert_eq!(b.registry.len().await, 1);
}

#[tokio::test]
async fn test_malformed_record_dropped_from_syn() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;

    let mut known = encode_peers(&[Peer::new(key(3), addr(3)), Peer::new(key(4), addr(4))]);
    known[0].port = 0;
    known.push({
        let mut record = PeerRecord::from(&Peer::new(key(5), addr(5)).with_state(ok_state()));
        if let Some(app_state) = record.app_state.as_mut() {
            app_state.status = 42;
        }
        record
    });

    let request = SynRequest {
        initiator: PeerRecord::from(&a.registry.owned_peer().await),
        receiver: PeerRecord::stub(addr(2)),
        known_peers: known,
    };
    let syn_ack = b.engine.synchronize(request).await;

    let unknown: Vec<_> = syn_ack.unknown_peers.iter().map(|r| r.key()).collect();
    assert_eq!(unknown, vec![key(4)]);
}

#[tokio::test]
async fn test_syn_never_overwrites_receiver_self_record() {
    let transport = RecordingTransport::default();
    let (a, b) = pair(&transport).await;
    let before = b.registry.owned_peer().await;

    // Claims to be B, fresher than B's own record
    let impostor = Peer::new(key(2), addr(9))
        .with_state(ok_state())
        .with_generation_time(Utc::now() + Duration::seconds(30));
    let request = SynRequest {
        initiator: PeerRecord::from(&a.registry.owned_peer().await),
        receiver: PeerRecord::stub(addr(2)),
        known_peers: encode_peers(&[a.registry.owned_peer().await, impostor]),
    };
    let syn_ack = b.engine.synchronize(request).await;

    assert_eq!(b.registry.owned_peer().await, before);
    assert_eq!(b.registry.len().await, 1);
    assert_eq!(syn_ack.receiver.key(), key(2));
    assert_eq!(syn_ack.receiver.ip, addr(2).ip().to_string());
    let unknown: Vec<_> = syn_ack.unknown_peers.iter().map(|r| r.key()).collect();
    assert_eq!(unknown, vec![key(1)]);
}

#[tokio::test]
async fn test_ack_ignores_self_record() {
    let transport = RecordingTransport::default();
    let (_a, b) = pair(&transport).await;
    let before = b.registry.owned_peer().await;

    let impostor = Peer::new(key(2), addr(9)).with_state(ok_state());
    let request = peergossip::sync::AckRequest {
        initiator: PeerRecord::stub(addr(9)),
        receiver: PeerRecord::from(&before),
        requested_peers: encode_peers(&[impostor]),
    };
    b.engine.acknowledge(request).await;

    assert_eq!(b.registry.owned_peer().await, before);
    assert_eq!(b.registry.len().await, 1);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_insert_once() {
    let transport = RecordingTransport::default();
    let a = TestNode::new(1, Arc::new(transport.clone()), GossipConfig::default());
    let b = TestNode::new(2, Arc::new(transport.clone()), GossipConfig::default());
    let c = TestNode::new(3, Arc::new(transport.clone()), GossipConfig::default());
    transport.inner.register(addr(2), b.engine.clone()).await;
    transport.inner.register(addr(3), c.engine.clone()).await;

    // B and C both know D and will both teach it to A
    let d = Peer::new(key(4), addr(4)).with_state(ok_state());
    b.registry.insert_peer(d.clone()).await.unwrap();
    c.registry.insert_peer(d).await.unwrap();

    let to_b = GossipTarget::seed(&SeedPeer::new(addr(2)));
    let to_c = GossipTarget::seed(&SeedPeer::new(addr(3)));
    let (first, second) = tokio::join!(a.engine.exchange(&to_b), a.engine.exchange(&to_c));
    first.unwrap();
    second.unwrap();

    let peers = a.registry.list_peers().await;
    assert_eq!(peers.iter().filter(|p| p.key() == &key(4)).count(), 1);
    assert_eq!(a.registry.len().await, 4);
    assert_eq!(
        a.notifier.notified().iter().filter(|k| **k == key(4)).count(),
        1
    );
}
