// Reconciliation - Freshness-based merge of remote peer records
//
// A candidate replaces the stored record only when its snapshot is strictly
// fresher. Unknown keys are inserted and reported to the discovery notifier.
// Records carrying our own key never reach the registry.

use super::{MergeOutcome, Peer, PeerRegistry};
use crate::identity::PeerKey;
use crate::probe::DiscoveryNotifier;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// True when `candidate` is strictly fresher than `stored` at `now`
pub fn supersedes(candidate: &Peer, stored: &Peer, now: DateTime<Utc>) -> bool {
    candidate.elapsed_heartbeats_at(now) < stored.elapsed_heartbeats_at(now)
}

/// What a batch merge did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Keys stored for the first time, in arrival order
    pub inserted: Vec<PeerKey>,
    pub replaced: usize,
    pub unchanged: usize,
    pub skipped_self: usize,
    /// Notifications delivered before the first notifier failure
    pub notified: usize,
}

impl ReconcileReport {
    /// Whether the batch changed the registry
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || self.replaced > 0
    }
}

/// Applies remote records to the registry
#[derive(Clone)]
pub struct Reconciler {
    registry: PeerRegistry,
    notifier: Arc<dyn DiscoveryNotifier>,
}

impl Reconciler {
    pub fn new(registry: PeerRegistry, notifier: Arc<dyn DiscoveryNotifier>) -> Self {
        Self { registry, notifier }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Insert unknown peers and refresh known ones
    pub async fn reconcile(&self, candidates: Vec<Peer>) -> ReconcileReport {
        self.apply(candidates, true).await
    }

    /// Refresh peers we already store; unknown keys are ignored
    pub async fn refresh_known(&self, candidates: Vec<Peer>) -> ReconcileReport {
        self.apply(candidates, false).await
    }

    async fn apply(&self, candidates: Vec<Peer>, allow_insert: bool) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut fresh = Vec::new();

        for candidate in candidates {
            if candidate.key() == self.registry.self_key() {
                report.skipped_self += 1;
                continue;
            }

            let now = Utc::now();
            let outcome = self
                .registry
                .merge_peer(candidate.clone(), allow_insert, |c, s| supersedes(c, s, now))
                .await;

            match outcome {
                MergeOutcome::Inserted => {
                    report.inserted.push(candidate.key().clone());
                    fresh.push(candidate);
                }
                MergeOutcome::Replaced => {
                    tracing::trace!(peer = %candidate.key(), "Applied fresher snapshot");
                    report.replaced += 1;
                }
                MergeOutcome::Unchanged => report.unchanged += 1,
                MergeOutcome::RejectedSelf => report.skipped_self += 1,
            }
        }

        // Registry changes above stand even if the notifier gives up midway
        for peer in &fresh {
            if let Err(e) = self.notifier.notify(peer).await {
                tracing::warn!(
                    peer = %peer.key(),
                    error = %e,
                    skipped = fresh.len() - report.notified - 1,
                    "Discovery notifier failed, dropping remaining notifications"
                );
                break;
            }
            report.notified += 1;
        }

        report
    }
}
