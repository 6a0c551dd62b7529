// Shared fixtures for the sync tests

#![allow(dead_code)]

use async_trait::async_trait;
use peergossip::identity::PeerKey;
use peergossip::membership::{
    FixedSelector, Peer, PeerRegistry, PeerSelector, PeerState, PeerStatus, Reconciler, SeedPeer,
};
use peergossip::probe::{FixedGeoLocator, FixedMetricsProbe, MemoryNotifier};
use peergossip::sync::{
    AckRequest, GossipConfig, GossipScheduler, SelfRefresher, SynAck, SynRequest, SyncEngine,
};
use peergossip::transport::{GossipTransport, MemoryTransport, TcpTransportConfig, TransportError};
use peergossip::NodeConfig;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn key(b: u8) -> PeerKey {
    PeerKey::from_bytes(vec![b; 32])
}

pub fn addr(b: u8) -> SocketAddr {
    format!("10.0.0.{}:7000", b).parse().unwrap()
}

pub fn ok_state() -> PeerState {
    let mut state = PeerState::bootstrapping("1.0.0", 3);
    state.status = PeerStatus::Ok;
    state
}

/// Transport wrapper that remembers every request it carried
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub inner: MemoryTransport,
    pub syns: Arc<Mutex<Vec<(SocketAddr, SynRequest)>>>,
    pub acks: Arc<Mutex<Vec<(SocketAddr, AckRequest)>>>,
}

#[async_trait]
impl GossipTransport for RecordingTransport {
    async fn synchronize(&self, target: SocketAddr, request: SynRequest) -> Result<SynAck, TransportError> {
        self.syns.lock().unwrap().push((target, request.clone()));
        self.inner.synchronize(target, request).await
    }

    async fn acknowledge(&self, target: SocketAddr, request: AckRequest) -> Result<(), TransportError> {
        self.acks.lock().unwrap().push((target, request.clone()));
        self.inner.acknowledge(target, request).await
    }
}

/// Transport that never answers in time
pub struct StalledTransport(pub Duration);

#[async_trait]
impl GossipTransport for StalledTransport {
    async fn synchronize(&self, target: SocketAddr, _request: SynRequest) -> Result<SynAck, TransportError> {
        tokio::time::sleep(self.0).await;
        Err(TransportError::Timeout(target))
    }

    async fn acknowledge(&self, target: SocketAddr, _request: AckRequest) -> Result<(), TransportError> {
        tokio::time::sleep(self.0).await;
        Err(TransportError::Timeout(target))
    }
}

/// One in-process node: registry, both protocol roles, a scheduler
pub struct TestNode {
    pub registry: PeerRegistry,
    pub engine: Arc<SyncEngine>,
    pub scheduler: Arc<GossipScheduler>,
    pub notifier: Arc<MemoryNotifier>,
}

impl TestNode {
    /// Node `b` listening on `addr(b)`, refreshed as healthy each round
    pub fn new(b: u8, transport: Arc<dyn GossipTransport>, gossip: GossipConfig) -> Self {
        Self::with_selector(b, transport, gossip, Arc::new(FixedSelector::new(0)))
    }

    pub fn with_selector(
        b: u8,
        transport: Arc<dyn GossipTransport>,
        gossip: GossipConfig,
        selector: Arc<dyn PeerSelector>,
    ) -> Self {
        let config = NodeConfig::new(key(b))
            .with_transport(TcpTransportConfig::new().with_bind_port(addr(b).port()));
        let registry = PeerRegistry::new(Peer::new_self(key(b), addr(b), "1.0.0", 3));
        let notifier = Arc::new(MemoryNotifier::new());
        let reconciler = Reconciler::new(registry.clone(), notifier.clone());
        let engine = Arc::new(SyncEngine::new(reconciler, transport));

        let refresher = Arc::new(SelfRefresher::new(
            registry.clone(),
            Arc::new(config),
            Arc::new(FixedGeoLocator::new(addr(b).ip(), 0.0, 0.0)),
            Arc::new(FixedMetricsProbe::new()),
        ));
        let scheduler = Arc::new(
            GossipScheduler::new(engine.clone(), selector, gossip).with_refresher(refresher),
        );

        Self {
            registry,
            engine,
            scheduler,
            notifier,
        }
    }

    pub async fn seed(&self, b: u8) {
        self.registry.store_seed(SeedPeer::new(addr(b))).await;
    }

    pub async fn keys(&self) -> Vec<PeerKey> {
        self.registry
            .list_peers()
            .await
            .iter()
            .map(|p| p.key().clone())
            .collect()
    }
}
