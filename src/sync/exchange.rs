// Exchange - The SYN/ACK handshake between two nodes
//
// Initiator: SYN with everything we know -> merge the SynAck's new peers ->
// ACK with detail on the peers the receiver asked about, if we hold it.
// Receiver: diff the SYN against our view, refresh what we already know,
// answer with what the initiator is missing and what we want detail on.

use super::protocol::{decode_peers, encode_peers, AckRequest, PeerRecord, SynAck, SynRequest};
use crate::identity::PeerKey;
use crate::membership::{Peer, PeerRegistry, ReconcileReport, Reconciler, SeedPeer};
use crate::transport::{GossipTransport, RequestHandler, TransportError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Round and exchange errors
#[derive(Error, Debug)]
pub enum GossipError {
    #[error("No seed peers configured")]
    NoSeeds,

    #[error("Exchange with {target} failed: {source}")]
    Network {
        target: SocketAddr,
        #[source]
        source: TransportError,
    },

    #[error("Round timed out after {0:?}")]
    RoundTimeout(Duration),
}

/// Progress of one exchange, as seen by the initiator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    SynSent,
    AckEvaluated,
    DetailSent,
    Done,
    Failed,
}

/// Someone to gossip with
#[derive(Clone, Debug, PartialEq)]
pub struct GossipTarget {
    pub address: SocketAddr,
    /// Known record of the target; None for a seed we have not identified
    pub peer: Option<Peer>,
}

impl GossipTarget {
    pub fn seed(seed: &SeedPeer) -> Self {
        Self {
            address: *seed.address(),
            peer: None,
        }
    }

    pub fn peer(peer: Peer) -> Self {
        Self {
            address: *peer.address(),
            peer: Some(peer),
        }
    }

    fn record(&self) -> PeerRecord {
        match &self.peer {
            Some(peer) => PeerRecord::from(peer),
            None => PeerRecord::stub(self.address),
        }
    }
}

/// What one completed exchange did
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeReport {
    pub target: SocketAddr,
    pub state: ExchangeState,
    /// Result of merging the receiver's new peers
    pub learned: ReconcileReport,
    /// How many peers the receiver asked detail for
    pub requested: usize,
    /// How many detailed records we sent back
    pub sent_detail: usize,
}

/// Peers in `candidates` whose key is absent from `have`
///
/// With `have` = our view and `candidates` = a SYN payload this yields the
/// peers we want detail on; swapping the arguments yields the peers to teach.
pub fn missing_from(have: &[Peer], candidates: &[Peer]) -> Vec<Peer> {
    let keys: HashSet<&PeerKey> = have.iter().map(|p| p.key()).collect();
    candidates
        .iter()
        .filter(|p| !keys.contains(p.key()))
        .cloned()
        .collect()
}

/// Both roles of the gossip handshake over a shared registry
pub struct SyncEngine {
    reconciler: Reconciler,
    transport: Arc<dyn GossipTransport>,
}

impl SyncEngine {
    pub fn new(reconciler: Reconciler, transport: Arc<dyn GossipTransport>) -> Self {
        Self {
            reconciler,
            transport,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        self.reconciler.registry()
    }

    // ========================================================================
    // INITIATOR
    // ========================================================================

    /// Run one exchange with `target`
    pub async fn exchange(&self, target: &GossipTarget) -> Result<ExchangeReport, GossipError> {
        let mut state = ExchangeState::Idle;
        let registry = self.registry();

        let known = registry.list_peers().await;
        let owned = registry.owned_peer().await;
        let request = SynRequest {
            initiator: PeerRecord::from(&owned),
            receiver: target.record(),
            known_peers: encode_peers(&known),
        };

        advance(&mut state, ExchangeState::SynSent, target.address);
        let syn_ack = match self.transport.synchronize(target.address, request).await {
            Ok(syn_ack) => syn_ack,
            Err(e) => return Err(fail(&mut state, target.address, e)),
        };

        advance(&mut state, ExchangeState::AckEvaluated, target.address);
        let learned = self.reconciler.reconcile(decode_peers(&syn_ack.new_peers)).await;

        let wanted: HashSet<PeerKey> = syn_ack.unknown_peers.iter().map(|r| r.key()).collect();
        let detail: Vec<Peer> = registry
            .list_peers()
            .await
            .into_iter()
            .filter(|p| wanted.contains(p.key()) && p.is_discovered())
            .collect();

        if !detail.is_empty() {
            let ack = AckRequest {
                initiator: PeerRecord::from(&owned),
                receiver: syn_ack.receiver.clone(),
                requested_peers: encode_peers(&detail),
            };

            advance(&mut state, ExchangeState::DetailSent, target.address);
            if let Err(e) = self.transport.acknowledge(target.address, ack).await {
                return Err(fail(&mut state, target.address, e));
            }
        }

        advance(&mut state, ExchangeState::Done, target.address);
        Ok(ExchangeReport {
            target: target.address,
            state,
            learned,
            requested: wanted.len(),
            sent_detail: detail.len(),
        })
    }
}

fn advance(state: &mut ExchangeState, next: ExchangeState, target: SocketAddr) {
    tracing::trace!(target = %target, from = ?state, to = ?next, "Exchange state");
    *state = next;
}

fn fail(state: &mut ExchangeState, target: SocketAddr, source: TransportError) -> GossipError {
    tracing::warn!(target = %target, during = ?state, error = %source, "Gossip exchange failed");
    *state = ExchangeState::Failed;
    GossipError::Network { target, source }
}

// ============================================================================
// RECEIVER
// ============================================================================

#[async_trait]
impl RequestHandler for SyncEngine {
    async fn synchronize(&self, request: SynRequest) -> SynAck {
        let registry = self.registry();
        let received = decode_peers(&request.known_peers);
        let local = registry.list_peers().await;

        let to_teach = missing_from(&received, &local);
        let unknown = missing_from(&local, &received);

        let unknown_keys: HashSet<&PeerKey> = unknown.iter().map(|p| p.key()).collect();
        let already_known: Vec<Peer> = received
            .iter()
            .filter(|p| !unknown_keys.contains(p.key()))
            .cloned()
            .collect();
        let refreshed = self.reconciler.refresh_known(already_known).await;

        tracing::debug!(
            initiator = %request.initiator.key(),
            offered = received.len(),
            teaching = to_teach.len(),
            requesting = unknown.len(),
            refreshed = refreshed.replaced,
            "Answered SYN"
        );

        SynAck {
            initiator: request.initiator,
            receiver: PeerRecord::from(&registry.owned_peer().await),
            new_peers: encode_peers(&to_teach),
            unknown_peers: encode_peers(&unknown),
        }
    }

    async fn acknowledge(&self, request: AckRequest) {
        let report = self
            .reconciler
            .reconcile(decode_peers(&request.requested_peers))
            .await;

        tracing::debug!(
            initiator = %request.initiator.key(),
            inserted = report.inserted.len(),
            replaced = report.replaced,
            "Applied ACK"
        );
    }
}
