// Transport Traits and Core Types
// Client and server seams of the two gossip RPCs, shared by the TCP and
// in-memory implementations

use crate::sync::{AckRequest, ProtocolError, SynAck, SynRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;

// ============================================================================
// TRANSPORT CONFIG
// ============================================================================

/// Timeouts and limits shared by every transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Request/response timeout in milliseconds
    pub message_timeout_ms: u64,
    /// Largest frame accepted in either direction
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            message_timeout_ms: 5_000,
            max_frame_size: 4 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_message_timeout_ms(mut self, ms: u64) -> Self {
        self.message_timeout_ms = ms;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connect_timeout_ms == 0 || self.message_timeout_ms == 0 {
            return Err(TransportError::InvalidConfig("timeouts must be non-zero".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(TransportError::InvalidConfig("max_frame_size cannot be 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// TRANSPORT ERROR
// ============================================================================

/// Network failures while talking to a peer
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection to {0} failed: {1}")]
    ConnectionFailed(SocketAddr, String),

    #[error("Timed out talking to {0}")]
    Timeout(SocketAddr),

    #[error("Peer {0} is unreachable")]
    Unreachable(SocketAddr),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Peer {0} rejected the request: {1}")]
    Rejected(SocketAddr, String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ============================================================================
// CLIENT / SERVER SEAMS
// ============================================================================

/// Client side: issue the two RPCs to a target address
#[async_trait]
pub trait GossipTransport: Send + Sync {
    async fn synchronize(&self, target: SocketAddr, request: SynRequest) -> Result<SynAck, TransportError>;

    async fn acknowledge(&self, target: SocketAddr, request: AckRequest) -> Result<(), TransportError>;
}

/// Server side: answers the two RPCs for other nodes' rounds
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn synchronize(&self, request: SynRequest) -> SynAck;

    async fn acknowledge(&self, request: AckRequest);
}
