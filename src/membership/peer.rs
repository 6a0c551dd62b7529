// Peer Model - The records exchanged and stored by the membership protocol
//
// A Peer is keyed by its PeerKey. Its state is absent until the peer has
// reported itself through a gossip exchange ("undiscovered" stub).

use crate::identity::PeerKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Lifecycle of a peer's own readiness
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerStatus {
    Fault,
    Bootstrapping,
    Ok,
    StorageOnly,
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerStatus::Fault => "fault",
            PeerStatus::Bootstrapping => "bootstrapping",
            PeerStatus::Ok => "ok",
            PeerStatus::StorageOnly => "storage-only",
        };
        f.write_str(s)
    }
}

/// Geographic position of a peer
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f32,
    pub lon: f32,
}

impl GeoPosition {
    pub fn new(lat: f32, lon: f32) -> Self {
        Self { lat, lon }
    }
}

/// Self-reported application state of a discovered peer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    pub status: PeerStatus,
    pub version: String,
    pub geo: GeoPosition,
    /// Replication fan-out hint
    pub p2p_factor: u32,
    pub cpu_load: f32,
    pub io_wait_rate: f32,
    pub free_disk_space: f32,
}

impl PeerState {
    /// A freshly started node: nothing probed yet
    pub fn bootstrapping(version: &str, p2p_factor: u32) -> Self {
        Self {
            status: PeerStatus::Bootstrapping,
            version: version.to_string(),
            geo: GeoPosition::default(),
            p2p_factor,
            cpu_load: 0.0,
            io_wait_rate: 0.0,
            free_disk_space: 0.0,
        }
    }
}

/// Identity and liveness record of a network participant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    key: PeerKey,
    address: SocketAddr,
    /// When this snapshot of the peer was produced
    generation_time: DateTime<Utc>,
    is_self: bool,
    state: Option<PeerState>,
}

impl Peer {
    /// Create an undiscovered stub, generated now
    pub fn new(key: PeerKey, address: SocketAddr) -> Self {
        Self {
            key,
            address,
            generation_time: Utc::now(),
            is_self: false,
            state: None,
        }
    }

    /// Create the local node's own record in Bootstrapping status
    pub fn new_self(key: PeerKey, address: SocketAddr, version: &str, p2p_factor: u32) -> Self {
        Self {
            key,
            address,
            generation_time: Utc::now(),
            is_self: true,
            state: Some(PeerState::bootstrapping(version, p2p_factor)),
        }
    }

    /// Attach a state
    pub fn with_state(mut self, state: PeerState) -> Self {
        self.state = Some(state);
        self
    }

    /// Override the generation time
    pub fn with_generation_time(mut self, generation_time: DateTime<Utc>) -> Self {
        self.generation_time = generation_time;
        self
    }

    pub fn key(&self) -> &PeerKey {
        &self.key
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    pub fn generation_time(&self) -> DateTime<Utc> {
        self.generation_time
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn state(&self) -> Option<&PeerState> {
        self.state.as_ref()
    }

    /// Seconds elapsed since this snapshot was generated; lower is fresher
    pub fn elapsed_heartbeats(&self) -> i64 {
        self.elapsed_heartbeats_at(Utc::now())
    }

    /// Elapsed heartbeats measured against a fixed instant
    pub fn elapsed_heartbeats_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.generation_time).num_seconds()
    }

    /// Discovered means the peer has reported itself as Ok
    pub fn is_discovered(&self) -> bool {
        matches!(&self.state, Some(state) if state.status == PeerStatus::Ok)
    }

    pub(crate) fn into_self(mut self) -> Self {
        self.is_self = true;
        self
    }

    pub(crate) fn into_remote(mut self) -> Self {
        self.is_self = false;
        self
    }
}

/// Bootstrap contact loaded from static configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedPeer {
    address: SocketAddr,
}

impl SeedPeer {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }
}

impl From<SocketAddr> for SeedPeer {
    fn from(address: SocketAddr) -> Self {
        Self::new(address)
    }
}
