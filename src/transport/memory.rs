// In-Memory Transport
// Routes RPCs to request handlers registered under an address, inside one
// process. Addresses can be cut off to simulate unreachable peers.

use super::{GossipTransport, RequestHandler, TransportError};
use crate::sync::{AckRequest, SynAck, SynRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryTransport {
    routes: Arc<RwLock<HashMap<SocketAddr, Arc<dyn RequestHandler>>>>,
    unreachable: Arc<RwLock<HashSet<SocketAddr>>>,
    syn_calls: Arc<AtomicUsize>,
    ack_calls: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `address` with `handler`
    pub async fn register(&self, address: SocketAddr, handler: Arc<dyn RequestHandler>) {
        self.routes.write().await.insert(address, handler);
    }

    /// Make calls to `address` fail (or work again)
    pub async fn set_unreachable(&self, address: SocketAddr, unreachable: bool) {
        let mut set = self.unreachable.write().await;
        if unreachable {
            set.insert(address);
        } else {
            set.remove(&address);
        }
    }

    pub fn syn_calls(&self) -> usize {
        self.syn_calls.load(Ordering::SeqCst)
    }

    pub fn ack_calls(&self) -> usize {
        self.ack_calls.load(Ordering::SeqCst)
    }

    async fn route(&self, target: SocketAddr) -> Result<Arc<dyn RequestHandler>, TransportError> {
        if self.unreachable.read().await.contains(&target) {
            return Err(TransportError::Unreachable(target));
        }
        self.routes
            .read()
            .await
            .get(&target)
            .cloned()
            .ok_or_else(|| TransportError::ConnectionFailed(target, "no route".to_string()))
    }
}

#[async_trait]
impl GossipTransport for MemoryTransport {
    async fn synchronize(&self, target: SocketAddr, request: SynRequest) -> Result<SynAck, TransportError> {
        self.syn_calls.fetch_add(1, Ordering::SeqCst);
        let handler = self.route(target).await?;
        Ok(handler.synchronize(request).await)
    }

    async fn acknowledge(&self, target: SocketAddr, request: AckRequest) -> Result<(), TransportError> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);
        let handler = self.route(target).await?;
        handler.acknowledge(request).await;
        Ok(())
    }
}
