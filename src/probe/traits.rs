// Collaborator Traits
// Interfaces the gossip core consumes from configuration, geolocation,
// system metrics and discovery observers

use crate::identity::PeerKey;
use crate::membership::{Peer, PeerError, PeerStatus};
use async_trait::async_trait;
use std::net::IpAddr;
use thiserror::Error;

/// Errors from geolocation and metrics probes
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Geolocation lookup failed: {0}")]
    GeoLookupFailed(String),

    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("Refreshed self record rejected: {0}")]
    SelfRecordRejected(#[from] PeerError),
}

/// Errors raised by a discovery notifier
#[derive(Error, Debug)]
#[error("Discovery notification failed: {0}")]
pub struct NotifyError(pub String);

/// Static node configuration
pub trait ConfigurationReader: Send + Sync {
    fn public_key(&self) -> PeerKey;
    fn port(&self) -> u16;
    fn p2p_factor(&self) -> u32;
    fn version(&self) -> String;
}

/// Result of a geolocation lookup
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoLookup {
    /// Public IP the node is reachable at
    pub ip: IpAddr,
    pub lat: f32,
    pub lon: f32,
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn lookup(&self) -> Result<GeoLookup, ProbeError>;
}

/// System health of the local node
#[async_trait]
pub trait MetricsProbe: Send + Sync {
    async fn status(&self) -> Result<PeerStatus, ProbeError>;
    async fn cpu_load(&self) -> Result<f32, ProbeError>;
    async fn free_disk_space(&self) -> Result<f32, ProbeError>;
    async fn io_wait_rate(&self) -> Result<f32, ProbeError>;
}

/// Observer told about every peer the first time it enters the registry
#[async_trait]
pub trait DiscoveryNotifier: Send + Sync {
    async fn notify(&self, peer: &Peer) -> Result<(), NotifyError>;
}
