// PeerStore - Persistent key-value storage using sled
//
// Provides typed access for storing:
// - The node keypair, so identity survives restarts
// - A snapshot of remote peers, to warm-start the registry

use crate::identity::{NodeKeypair, PeerKey};
use crate::membership::Peer;
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const IDENTITY_SECRET: &[u8] = b"identity:secret";
    pub const PEER_PREFIX: &[u8] = b"peer:";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of peers in the snapshot
    pub peer_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Persistent store for membership data
///
/// Uses sled for crash-safe, embedded storage.
/// All writes are atomic and durable after flush.
pub struct PeerStore {
    db: sled::Db,
}

impl PeerStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            peer_count: self.db.scan_prefix(keys::PEER_PREFIX).count(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        })
    }

    // ========================================================================
    // IDENTITY PERSISTENCE
    // ========================================================================

    /// Load the stored keypair, generating and saving one on first use
    pub fn get_or_create_keypair(&self) -> Result<NodeKeypair, StoreError> {
        if let Some(bytes) = self.db.get(keys::IDENTITY_SECRET)? {
            return NodeKeypair::from_bytes(&bytes)
                .map_err(|e| StoreError::DeserializationFailed(e.to_string()));
        }

        let keypair = NodeKeypair::generate();
        self.db
            .insert(keys::IDENTITY_SECRET, keypair.secret_bytes().to_vec())?;
        Ok(keypair)
    }

    // ========================================================================
    // PEER SNAPSHOT
    // ========================================================================

    fn peer_key(key: &PeerKey) -> Vec<u8> {
        [keys::PEER_PREFIX, key.as_bytes()].concat()
    }

    /// Replace the stored snapshot with `peers`
    ///
    /// Self records are never written; every node rebuilds its own.
    pub fn save_peers(&self, peers: &[Peer]) -> Result<usize, StoreError> {
        let mut batch = sled::Batch::default();
        for result in self.db.scan_prefix(keys::PEER_PREFIX) {
            let (key, _) = result?;
            batch.remove(key);
        }

        let mut saved = 0;
        for peer in peers.iter().filter(|p| !p.is_self()) {
            let bytes = postcard::to_allocvec(peer)
                .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
            batch.insert(Self::peer_key(peer.key()), bytes);
            saved += 1;
        }

        self.db.apply_batch(batch)?;
        Ok(saved)
    }

    /// Load every stored peer
    pub fn load_peers(&self) -> Result<Vec<Peer>, StoreError> {
        let mut peers = Vec::new();
        for result in self.db.scan_prefix(keys::PEER_PREFIX) {
            let (_, value) = result?;
            let peer: Peer = postcard::from_bytes(&value)
                .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
            peers.push(peer);
        }
        Ok(peers)
    }
}
