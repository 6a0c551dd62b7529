// Registry Tests
// Tests for the shared membership view under concurrent access

use chrono::{Duration, Utc};
use peergossip::identity::PeerKey;
use peergossip::membership::{
    supersedes, MergeOutcome, Peer, PeerRegistry, PeerState, PeerStatus, SeedPeer,
};
use std::net::SocketAddr;

fn key(b: u8) -> PeerKey {
    PeerKey::from_bytes(vec![b; 32])
}

fn addr(b: u8) -> SocketAddr {
    format!("10.0.0.{}:7000", b).parse().unwrap()
}

fn registry() -> PeerRegistry {
    PeerRegistry::new(Peer::new_self(key(0), addr(0), "1.0.0", 3))
}

fn ok_state() -> PeerState {
    let mut state = PeerState::bootstrapping("1.0.0", 3);
    state.status = PeerStatus::Ok;
    state
}

// ============================================================================
// BASIC OPERATIONS
// ============================================================================

#[tokio::test]
async fn test_owned_peer_is_self() {
    let registry = registry();
    let owned = registry.owned_peer().await;

    assert!(owned.is_self());
    assert_eq!(owned.key(), registry.self_key());
}

#[tokio::test]
async fn test_update_replaces_by_key() {
    let registry = registry();
    registry.insert_peer(Peer::new(key(1), addr(1))).await.unwrap();

    let moved = Peer::new(key(1), addr(7)).with_state(ok_state());
    registry.update_peer(moved).await.unwrap();

    let stored = registry.contains_peer(&key(1)).await.unwrap();
    assert_eq!(stored.address(), &addr(7));
    assert!(stored.is_discovered());
    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn test_update_unknown_peer_fails() {
    let registry = registry();
    let result = registry.update_peer(Peer::new(key(4), addr(4))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_stats_counts_discovered() {
    let registry = registry();
    registry.insert_peer(Peer::new(key(1), addr(1))).await.unwrap();
    registry
        .insert_peer(Peer::new(key(2), addr(2)).with_state(ok_state()))
        .await
        .unwrap();
    registry.store_seed(SeedPeer::new(addr(9))).await;

    let stats = registry.stats().await;
    assert_eq!(stats.total_peers, 3);
    assert_eq!(stats.discovered_peers, 1);
    assert_eq!(stats.undiscovered_peers, 2);
    assert_eq!(stats.seeds, 1);
    assert_eq!(registry.discovered_count().await, stats.discovered_peers);
}

#[tokio::test]
async fn test_merge_never_touches_self() {
    let registry = registry();
    let fresher_self = Peer::new(key(0), addr(5)).with_generation_time(Utc::now() + Duration::hours(1));

    let outcome = registry.merge_peer(fresher_self, true, |_, _| true).await;

    assert_eq!(outcome, MergeOutcome::RejectedSelf);
    assert_eq!(registry.owned_peer().await.address(), &addr(0));
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_inserts_store_one_record() {
    let registry = registry();
    let mut handles = Vec::new();

    for i in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let candidate = Peer::new(key(42), addr(i % 200));
            let now = Utc::now();
            registry
                .merge_peer(candidate, true, |c, s| supersedes(c, s, now))
                .await
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap() == MergeOutcome::Inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    let matching = registry
        .list_peers()
        .await
        .into_iter()
        .filter(|p| p.key() == &key(42))
        .count();
    assert_eq!(matching, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_of_distinct_keys() {
    let registry = registry();
    let mut handles = Vec::new();

    for b in 1..=50u8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.insert_peer(Peer::new(key(b), addr(b))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry.known_peers().await.len(), 50);
}
