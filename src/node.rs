// Gossip Node - Assembly of registry, protocol server and round scheduler
//
// bootstrap() builds every component around one shared registry; run()
// serves other nodes' rounds and drives our own until shutdown.

use crate::config::{ConfigError, NodeConfig};
use crate::membership::{
    Peer, PeerRegistry, PeerSelector, RandomSelector, Reconciler, SeedPeer,
};
use crate::probe::{
    DiscoveryNotifier, FixedGeoLocator, FixedMetricsProbe, GeoLocator, LoggingNotifier,
    MetricsProbe,
};
use crate::storage::{PeerStore, StoreError};
use crate::sync::{GossipScheduler, SelfRefresher, SyncEngine};
use crate::transport::{TcpServer, TcpTransport, TransportError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// External probes and observers a node is built with
#[derive(Clone)]
pub struct Collaborators {
    pub geo: Arc<dyn GeoLocator>,
    pub metrics: Arc<dyn MetricsProbe>,
    pub notifier: Arc<dyn DiscoveryNotifier>,
    pub selector: Arc<dyn PeerSelector>,
}

impl Collaborators {
    /// Fixed location, healthy metrics, log-only notifier, random selection
    pub fn fixed(ip: IpAddr, lat: f32, lon: f32) -> Self {
        Self {
            geo: Arc::new(FixedGeoLocator::new(ip, lat, lon)),
            metrics: Arc::new(FixedMetricsProbe::new()),
            notifier: Arc::new(LoggingNotifier),
            selector: Arc::new(RandomSelector),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DiscoveryNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn PeerSelector>) -> Self {
        self.selector = selector;
        self
    }
}

pub struct GossipNode {
    config: Arc<NodeConfig>,
    registry: PeerRegistry,
    engine: Arc<SyncEngine>,
    scheduler: Arc<GossipScheduler>,
    server: TcpServer,
    store: Option<PeerStore>,
}

impl GossipNode {
    /// Validate configuration, bind the server and build the self peer
    pub async fn bootstrap(
        mut config: NodeConfig,
        collaborators: Collaborators,
        store: Option<PeerStore>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let server = TcpServer::bind(config.transport.clone()).await?;
        let local_addr = server.local_addr();
        // Port 0 means "pick one"; advertise the one we got
        config.transport.bind_port = local_addr.port();
        let config = Arc::new(config);

        let owned = Peer::new_self(
            config.public_key.clone(),
            local_addr,
            &config.version,
            config.p2p_factor,
        );
        let registry = PeerRegistry::new(owned);
        for seed in &config.seeds {
            registry.store_seed(SeedPeer::new(*seed)).await;
        }

        if let Some(store) = &store {
            let restored = restore_snapshot(&registry, store).await?;
            tracing::info!(peers = restored, "Restored membership snapshot");
        }

        let transport = Arc::new(TcpTransport::new(config.transport.clone()));
        let reconciler = Reconciler::new(registry.clone(), collaborators.notifier.clone());
        let engine = Arc::new(SyncEngine::new(reconciler, transport));
        let refresher = Arc::new(SelfRefresher::new(
            registry.clone(),
            config.clone(),
            collaborators.geo.clone(),
            collaborators.metrics.clone(),
        ));
        let scheduler = Arc::new(
            GossipScheduler::new(engine.clone(), collaborators.selector.clone(), config.gossip.clone())
                .with_refresher(refresher),
        );

        tracing::info!(
            peer = %config.public_key,
            addr = %local_addr,
            seeds = config.seeds.len(),
            "Gossip node bootstrapped"
        );

        Ok(Self {
            config,
            registry,
            engine,
            scheduler,
            server,
            store,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> Arc<GossipScheduler> {
        self.scheduler.clone()
    }

    /// Serve and gossip until `shutdown` flips to true
    ///
    /// Returns the store, if any, after the final snapshot has been flushed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<Option<PeerStore>, NodeError> {
        let server_task = tokio::spawn(self.server.serve(self.engine.clone(), shutdown.clone()));
        let scheduler_task = tokio::spawn(self.scheduler.clone().run(shutdown.clone()));

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        if let Err(e) = server_task.await {
            tracing::warn!(error = %e, "Gossip server task ended abnormally");
        }
        if let Err(e) = scheduler_task.await {
            tracing::warn!(error = %e, "Gossip scheduler task ended abnormally");
        }

        if let Some(store) = &self.store {
            let peers = self.registry.known_peers().await;
            match store.save_peers(&peers).and_then(|_| store.flush()) {
                Ok(()) => tracing::info!(peers = peers.len(), "Saved membership snapshot"),
                Err(e) => tracing::warn!(error = %e, "Failed to save membership snapshot"),
            }
        }

        let stats = self.registry.stats().await;
        tracing::info!(
            peers = stats.total_peers,
            discovered = stats.discovered_peers,
            "Gossip node stopped"
        );
        Ok(self.store)
    }
}

async fn restore_snapshot(registry: &PeerRegistry, store: &PeerStore) -> Result<usize, StoreError> {
    let mut restored = 0;
    for peer in store.load_peers()? {
        if peer.key() == registry.self_key() {
            continue;
        }
        if registry.insert_peer(peer).await.is_ok() {
            restored += 1;
        }
    }
    Ok(restored)
}
