// Node Configuration
// Static settings of a gossip node. Loaded once at startup; a node without
// seed peers cannot join the network and refuses to start.

use crate::identity::PeerKey;
use crate::probe::ConfigurationReader;
use crate::sync::GossipConfig;
use crate::transport::{TcpTransportConfig, TransportError};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Seed peer list is empty")]
    NoSeeds,

    #[error("Gossip interval must be non-zero")]
    InvalidInterval,

    #[error("Invalid identity key: {0}")]
    InvalidKey(String),

    #[error("Invalid transport configuration: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub public_key: PeerKey,
    /// Replication fan-out hint advertised to peers
    pub p2p_factor: u32,
    pub version: String,
    pub seeds: Vec<SocketAddr>,
    pub gossip: GossipConfig,
    pub transport: TcpTransportConfig,
}

impl NodeConfig {
    pub fn new(public_key: PeerKey) -> Self {
        Self {
            public_key,
            p2p_factor: 3,
            version: env!("CARGO_PKG_VERSION").to_string(),
            seeds: Vec::new(),
            gossip: GossipConfig::default(),
            transport: TcpTransportConfig::default(),
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<SocketAddr>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_seed(mut self, seed: SocketAddr) -> Self {
        self.seeds.push(seed);
        self
    }

    pub fn with_p2p_factor(mut self, p2p_factor: u32) -> Self {
        self.p2p_factor = p2p_factor;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_gossip(mut self, gossip: GossipConfig) -> Self {
        self.gossip = gossip;
        self
    }

    pub fn with_transport(mut self, transport: TcpTransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }
        if self.public_key.is_empty() {
            return Err(ConfigError::InvalidKey("empty public key".to_string()));
        }
        if self.gossip.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        self.transport.base.validate()?;
        Ok(())
    }
}

impl ConfigurationReader for NodeConfig {
    fn public_key(&self) -> PeerKey {
        self.public_key.clone()
    }

    fn port(&self) -> u16 {
        self.transport.bind_port
    }

    fn p2p_factor(&self) -> u32 {
        self.p2p_factor
    }

    fn version(&self) -> String {
        self.version.clone()
    }
}
