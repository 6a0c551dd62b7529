// Peer Registry - The authoritative local membership view
//
// Holds the self peer, every remote peer we have heard of, and the seed
// list. All access goes through one RwLock so lookups and inserts for the
// same key can never interleave.

use super::{Peer, SeedPeer};
use crate::identity::PeerKey;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PeerError {
    #[error("Cannot add self as a peer")]
    CannotAddSelf,

    #[error("Self peer can only be replaced by a self record")]
    CannotOverwriteSelf,

    #[error("Peer {0} already known")]
    AlreadyKnown(PeerKey),

    #[error("Peer {0} not found")]
    PeerNotFound(PeerKey),
}

/// Result of merging a candidate record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Key was unknown, candidate stored
    Inserted,
    /// Candidate replaced the stored record
    Replaced,
    /// Stored record kept
    Unchanged,
    /// Candidate carried the self key
    RejectedSelf,
}

/// Statistics about a registry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_peers: usize,
    pub discovered_peers: usize,
    pub undiscovered_peers: usize,
    pub seeds: usize,
}

struct RegistryInner {
    /// Insertion order; index 0 is always the self peer
    peers: Vec<Peer>,
    index: HashMap<PeerKey, usize>,
    seeds: Vec<SeedPeer>,
}

impl RegistryInner {
    fn get(&self, key: &PeerKey) -> Option<&Peer> {
        self.index.get(key).map(|&i| &self.peers[i])
    }

    fn push(&mut self, peer: Peer) {
        self.index.insert(peer.key().clone(), self.peers.len());
        self.peers.push(peer);
    }

    fn replace(&mut self, peer: Peer) -> bool {
        match self.index.get(peer.key()) {
            Some(&i) => {
                self.peers[i] = peer;
                true
            }
            None => false,
        }
    }
}

/// Shared handle to the membership view
#[derive(Clone)]
pub struct PeerRegistry {
    self_key: PeerKey,
    inner: Arc<RwLock<RegistryInner>>,
}

impl PeerRegistry {
    /// Create a registry owning the given self peer
    pub fn new(owned: Peer) -> Self {
        let owned = owned.into_self();
        let self_key = owned.key().clone();
        let mut inner = RegistryInner {
            peers: Vec::new(),
            index: HashMap::new(),
            seeds: Vec::new(),
        };
        inner.push(owned);

        Self {
            self_key,
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Key of the local node
    pub fn self_key(&self) -> &PeerKey {
        &self.self_key
    }

    /// Ordered snapshot of every peer, self first
    pub async fn list_peers(&self) -> Vec<Peer> {
        self.inner.read().await.peers.clone()
    }

    /// Every peer except the self peer
    pub async fn known_peers(&self) -> Vec<Peer> {
        self.inner
            .read()
            .await
            .peers
            .iter()
            .filter(|p| p.key() != &self.self_key)
            .cloned()
            .collect()
    }

    pub async fn list_seeds(&self) -> Vec<SeedPeer> {
        self.inner.read().await.seeds.clone()
    }

    /// The self record
    pub async fn owned_peer(&self) -> Peer {
        // Slot 0 is filled in `new` and never removed
        self.inner.read().await.peers[0].clone()
    }

    /// Look up a peer by key
    pub async fn contains_peer(&self, key: &PeerKey) -> Option<Peer> {
        self.inner.read().await.get(key).cloned()
    }

    /// Store a peer whose key is not yet known
    pub async fn insert_peer(&self, peer: Peer) -> Result<(), PeerError> {
        if peer.key() == &self.self_key {
            return Err(PeerError::CannotAddSelf);
        }

        let mut inner = self.inner.write().await;
        if inner.index.contains_key(peer.key()) {
            return Err(PeerError::AlreadyKnown(peer.key().clone()));
        }
        inner.push(peer.into_remote());
        Ok(())
    }

    /// Replace the stored record with the same key
    ///
    /// The self record can only be replaced by a record flagged as self,
    /// which only the self-refresh path produces.
    pub async fn update_peer(&self, peer: Peer) -> Result<(), PeerError> {
        let peer = if peer.key() == &self.self_key {
            if !peer.is_self() {
                return Err(PeerError::CannotOverwriteSelf);
            }
            peer
        } else {
            peer.into_remote()
        };

        let key = peer.key().clone();
        if self.inner.write().await.replace(peer) {
            Ok(())
        } else {
            Err(PeerError::PeerNotFound(key))
        }
    }

    /// Lookup plus insert-or-replace under a single write lock
    ///
    /// `supersedes(candidate, stored)` decides whether an existing record is
    /// replaced. Unknown keys are inserted only when `allow_insert` is set.
    pub async fn merge_peer<F>(&self, candidate: Peer, allow_insert: bool, supersedes: F) -> MergeOutcome
    where
        F: FnOnce(&Peer, &Peer) -> bool,
    {
        if candidate.key() == &self.self_key {
            return MergeOutcome::RejectedSelf;
        }
        let candidate = candidate.into_remote();

        let mut inner = self.inner.write().await;
        let replace = inner
            .get(candidate.key())
            .map(|stored| supersedes(&candidate, stored));

        match replace {
            Some(true) => {
                inner.replace(candidate);
                MergeOutcome::Replaced
            }
            Some(false) => MergeOutcome::Unchanged,
            None if allow_insert => {
                inner.push(candidate);
                MergeOutcome::Inserted
            }
            None => MergeOutcome::Unchanged,
        }
    }

    /// Remember a seed (duplicates by address are ignored)
    pub async fn store_seed(&self, seed: SeedPeer) {
        let mut inner = self.inner.write().await;
        if !inner.seeds.contains(&seed) {
            inner.seeds.push(seed);
        }
    }

    /// Number of peers including self
    pub async fn len(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    /// Peers currently reporting Ok, self included
    pub async fn discovered_count(&self) -> usize {
        self.inner
            .read()
            .await
            .peers
            .iter()
            .filter(|p| p.is_discovered())
            .count()
    }

    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        let discovered = inner.peers.iter().filter(|p| p.is_discovered()).count();

        RegistryStats {
            total_peers: inner.peers.len(),
            discovered_peers: discovered,
            undiscovered_peers: inner.peers.len() - discovered,
            seeds: inner.seeds.len(),
        }
    }
}
