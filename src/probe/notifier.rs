// Discovery Notifiers
// A logging notifier for the daemon and an in-memory one that records
// (and can refuse) notifications for tests

use super::{DiscoveryNotifier, NotifyError};
use crate::identity::PeerKey;
use crate::membership::Peer;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Logs every newly discovered peer
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl DiscoveryNotifier for LoggingNotifier {
    async fn notify(&self, peer: &Peer) -> Result<(), NotifyError> {
        tracing::info!(
            peer = %peer.key(),
            addr = %peer.address(),
            discovered = peer.is_discovered(),
            "Discovered new peer"
        );
        Ok(())
    }
}

/// Records notified keys in order
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    seen: Mutex<Vec<PeerKey>>,
    /// Fail once this many notifications have succeeded
    fail_after: Option<usize>,
    attempts: AtomicUsize,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` notifications, then fail every later one
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    pub fn notified(&self) -> Vec<PeerKey> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryNotifier for MemoryNotifier {
    async fn notify(&self, peer: &Peer) -> Result<(), NotifyError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if matches!(self.fail_after, Some(limit) if attempt >= limit) {
            return Err(NotifyError(format!("refusing {}", peer.key())));
        }

        let mut seen = self
            .seen
            .lock()
            .map_err(|_| NotifyError("notifier lock poisoned".to_string()))?;
        seen.push(peer.key().clone());
        Ok(())
    }
}
