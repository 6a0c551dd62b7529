// Protocol - Message types for membership gossip
//
// Defines the wire format of the two RPCs:
// - Synchronize(SynRequest) -> SynAck
// - Acknowledge(AckRequest) -> Empty
//
// Peer records are validated one by one when decoded; a malformed record is
// dropped without failing the message that carried it.

use crate::identity::PeerKey;
use crate::membership::{GeoPosition, Peer, PeerState, PeerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed")]
    DeserializationFailed,

    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Peer record has an empty public key")]
    EmptyPublicKey,

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Invalid port: {0}")]
    InvalidPort(i32),

    #[error("Unknown peer status: {0}")]
    UnknownStatus(i32),

    #[error("Invalid generation time: {0}")]
    InvalidGenerationTime(i64),

    #[error("Invalid field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

// ============================================================================
// PEER RECORD
// ============================================================================

/// Liveness part of a peer record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub generation_time_unix: i64,
    pub elapsed_beats: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub lat: f32,
    pub lon: f32,
}

/// Application state part of a peer record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppStateRecord {
    /// 0 = Fault, 1 = Bootstrapping, 2 = Ok, 3 = StorageOnly
    pub status: i32,
    pub cpu_load: String,
    pub io_wait_rate: f32,
    pub free_disk_space: f32,
    pub version: String,
    pub geo: GeoRecord,
    pub p2p_factor: i32,
}

/// A peer as it travels on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub public_key: Vec<u8>,
    pub ip: String,
    pub port: i32,
    pub heartbeat: HeartbeatRecord,
    /// Absent for undiscovered peers
    pub app_state: Option<AppStateRecord>,
}

impl PeerRecord {
    /// Address-only record for a contact whose key we do not know yet
    pub fn stub(address: SocketAddr) -> Self {
        let now = Utc::now().timestamp();
        Self {
            public_key: Vec::new(),
            ip: address.ip().to_string(),
            port: i32::from(address.port()),
            heartbeat: HeartbeatRecord {
                generation_time_unix: now,
                elapsed_beats: 0,
            },
            app_state: None,
        }
    }

    /// Snapshot a peer, measuring elapsed beats at `now`
    pub fn from_peer_at(peer: &Peer, now: DateTime<Utc>) -> Self {
        Self {
            public_key: peer.key().as_bytes().to_vec(),
            ip: peer.address().ip().to_string(),
            port: i32::from(peer.address().port()),
            heartbeat: HeartbeatRecord {
                generation_time_unix: peer.generation_time().timestamp(),
                elapsed_beats: peer.elapsed_heartbeats_at(now),
            },
            app_state: peer.state().map(AppStateRecord::from),
        }
    }

    /// Key carried by this record, without validating the rest
    pub fn key(&self) -> PeerKey {
        PeerKey::from_bytes(self.public_key.clone())
    }
}

impl From<&Peer> for PeerRecord {
    fn from(peer: &Peer) -> Self {
        Self::from_peer_at(peer, Utc::now())
    }
}

impl From<&PeerState> for AppStateRecord {
    fn from(state: &PeerState) -> Self {
        Self {
            status: status_to_wire(state.status),
            cpu_load: format!("{:.2}", state.cpu_load),
            io_wait_rate: state.io_wait_rate,
            free_disk_space: state.free_disk_space,
            version: state.version.clone(),
            geo: GeoRecord {
                lat: state.geo.lat,
                lon: state.geo.lon,
            },
            p2p_factor: i32::try_from(state.p2p_factor).unwrap_or(i32::MAX),
        }
    }
}

impl TryFrom<&AppStateRecord> for PeerState {
    type Error = ProtocolError;

    fn try_from(record: &AppStateRecord) -> Result<Self, Self::Error> {
        let cpu_load = if record.cpu_load.trim().is_empty() {
            0.0
        } else {
            record
                .cpu_load
                .trim()
                .parse::<f32>()
                .map_err(|_| ProtocolError::InvalidField {
                    field: "cpu_load",
                    value: record.cpu_load.clone(),
                })?
        };

        let p2p_factor = u32::try_from(record.p2p_factor).map_err(|_| ProtocolError::InvalidField {
            field: "p2p_factor",
            value: record.p2p_factor.to_string(),
        })?;

        Ok(PeerState {
            status: status_from_wire(record.status)?,
            version: record.version.clone(),
            geo: GeoPosition::new(record.geo.lat, record.geo.lon),
            p2p_factor,
            cpu_load,
            io_wait_rate: record.io_wait_rate,
            free_disk_space: record.free_disk_space,
        })
    }
}

impl TryFrom<&PeerRecord> for Peer {
    type Error = ProtocolError;

    /// Records from the network always decode as remote peers
    fn try_from(record: &PeerRecord) -> Result<Self, Self::Error> {
        if record.public_key.is_empty() {
            return Err(ProtocolError::EmptyPublicKey);
        }

        let ip: IpAddr = record
            .ip
            .parse()
            .map_err(|_| ProtocolError::InvalidAddress(record.ip.clone()))?;

        let port = u16::try_from(record.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ProtocolError::InvalidPort(record.port))?;

        let generation_time = DateTime::<Utc>::from_timestamp(record.heartbeat.generation_time_unix, 0)
            .ok_or(ProtocolError::InvalidGenerationTime(
                record.heartbeat.generation_time_unix,
            ))?;

        let peer = Peer::new(record.key(), SocketAddr::new(ip, port))
            .with_generation_time(generation_time);

        match &record.app_state {
            Some(app_state) => Ok(peer.with_state(PeerState::try_from(app_state)?)),
            None => Ok(peer),
        }
    }
}

fn status_to_wire(status: PeerStatus) -> i32 {
    match status {
        PeerStatus::Fault => 0,
        PeerStatus::Bootstrapping => 1,
        PeerStatus::Ok => 2,
        PeerStatus::StorageOnly => 3,
    }
}

fn status_from_wire(value: i32) -> Result<PeerStatus, ProtocolError> {
    match value {
        0 => Ok(PeerStatus::Fault),
        1 => Ok(PeerStatus::Bootstrapping),
        2 => Ok(PeerStatus::Ok),
        3 => Ok(PeerStatus::StorageOnly),
        other => Err(ProtocolError::UnknownStatus(other)),
    }
}

/// Encode peers for a message
pub fn encode_peers(peers: &[Peer]) -> Vec<PeerRecord> {
    let now = Utc::now();
    peers.iter().map(|p| PeerRecord::from_peer_at(p, now)).collect()
}

/// Decode records, dropping (and logging) the malformed ones
pub fn decode_peers(records: &[PeerRecord]) -> Vec<Peer> {
    records
        .iter()
        .filter_map(|record| match Peer::try_from(record) {
            Ok(peer) => Some(peer),
            Err(e) => {
                tracing::warn!(
                    peer = %record.key(),
                    ip = %record.ip,
                    error = %e,
                    "Dropping malformed peer record"
                );
                None
            }
        })
        .collect()
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Opens an exchange: everything the initiator knows, self included
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynRequest {
    pub initiator: PeerRecord,
    pub receiver: PeerRecord,
    pub known_peers: Vec<PeerRecord>,
}

/// Receiver's answer to a SYN
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynAck {
    pub initiator: PeerRecord,
    pub receiver: PeerRecord,
    /// Peers the initiator is missing
    pub new_peers: Vec<PeerRecord>,
    /// Peers the receiver wants detail on
    pub unknown_peers: Vec<PeerRecord>,
}

/// Closes an exchange with the detail the receiver asked for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    pub initiator: PeerRecord,
    pub receiver: PeerRecord,
    pub requested_peers: Vec<PeerRecord>,
}

/// Request envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Synchronize(SynRequest),
    Acknowledge(AckRequest),
}

/// Response envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    SynAck(SynAck),
    Empty,
    /// The server could not decode or serve the request
    Rejected(String),
}

impl Request {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        postcard::to_allocvec(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        postcard::from_bytes(bytes).map_err(|_| ProtocolError::DeserializationFailed)
    }
}

impl Response {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        postcard::to_allocvec(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        postcard::from_bytes(bytes).map_err(|_| ProtocolError::DeserializationFailed)
    }
}
