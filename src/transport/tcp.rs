// TCP Transport Implementation
// Framed request/response over TCP. Each call dials a fresh connection,
// writes one request frame and reads one response frame.
//
// Frame: 4-byte big-endian length, then a postcard payload.

use super::{GossipTransport, RequestHandler, TransportConfig, TransportError};
use crate::sync::{AckRequest, ProtocolError, Request, Response, SynAck, SynRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Address to bind to
    pub bind_address: String,
    /// Port to bind to (0 for random)
    pub bind_port: u16,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 0,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base: TransportConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.base.connect_timeout_ms)
    }

    fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.base.message_timeout_ms)
    }
}

// ============================================================================
// FRAMING
// ============================================================================

/// Write one length-prefixed frame
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], limit: usize) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > limit {
        return Err(ProtocolError::MessageTooLarge {
            size: payload.len(),
            limit,
        }
        .into());
    }

    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::MessageTooLarge {
        size: payload.len(),
        limit,
    })?;

    writer
        .write_u32(len)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}

/// Read one length-prefixed frame
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = reader
        .read_u32()
        .await
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))? as usize;

    if len > limit {
        return Err(ProtocolError::MessageTooLarge { size: len, limit }.into());
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
    Ok(buf)
}

// ============================================================================
// TCP CLIENT
// ============================================================================

/// Dials a fresh connection per RPC
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    async fn call(&self, target: SocketAddr, request: &Request) -> Result<Response, TransportError> {
        let payload = request.to_bytes()?;

        let mut stream = timeout(self.config.connect_timeout(), TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::Timeout(target))?
            .map_err(|e| TransportError::ConnectionFailed(target, e.to_string()))?;
        stream.set_nodelay(self.config.nodelay).ok();

        let limit = self.config.base.max_frame_size;
        let exchange = async {
            write_frame(&mut stream, &payload, limit).await?;
            read_frame(&mut stream, limit).await
        };

        let bytes = timeout(self.config.message_timeout(), exchange)
            .await
            .map_err(|_| TransportError::Timeout(target))??;

        match Response::from_bytes(&bytes)? {
            Response::Rejected(reason) => Err(TransportError::Rejected(target, reason)),
            response => Ok(response),
        }
    }
}

#[async_trait]
impl GossipTransport for TcpTransport {
    async fn synchronize(&self, target: SocketAddr, request: SynRequest) -> Result<SynAck, TransportError> {
        match self.call(target, &Request::Synchronize(request)).await? {
            Response::SynAck(ack) => Ok(ack),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn acknowledge(&self, target: SocketAddr, request: AckRequest) -> Result<(), TransportError> {
        match self.call(target, &Request::Acknowledge(request)).await? {
            Response::Empty => Ok(()),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }
}

// ============================================================================
// TCP SERVER
// ============================================================================

/// Accepts gossip RPCs and hands them to a request handler
pub struct TcpServer {
    config: TcpTransportConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind the listener
    pub async fn bind(config: TcpTransportConfig) -> Result<Self, TransportError> {
        config.base.validate()?;

        let bind_addr = format!("{}:{}", config.bind_address, config.bind_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        Ok(Self {
            config,
            listener,
            local_addr,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` flips to true
    pub async fn serve(self, handler: Arc<dyn RequestHandler>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(addr = %self.local_addr, "Gossip server listening");
        let mut accept_failures: u32 = 0;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        accept_failures = 0;
                        let handler = handler.clone();
                        let config = self.config.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handler, &config).await {
                                tracing::debug!(remote = %remote, error = %e, "Gossip connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        accept_failures = accept_failures.saturating_add(1);
                        let backoff = accept_backoff(accept_failures);
                        tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "Accept failed");
                        tokio::time::sleep(backoff).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "Gossip server stopped");
    }
}

/// Pause after `failures` consecutive accept errors: 10ms doubling, capped at 1s
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(7);
    Duration::from_millis(10 * (1u64 << exponent)).min(Duration::from_secs(1))
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<dyn RequestHandler>,
    config: &TcpTransportConfig,
) -> Result<(), TransportError> {
    stream.set_nodelay(config.nodelay).ok();
    let limit = config.base.max_frame_size;
    let remote = stream
        .peer_addr()
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

    let bytes = timeout(config.message_timeout(), read_frame(&mut stream, limit))
        .await
        .map_err(|_| TransportError::Timeout(remote))??;

    let response = match Request::from_bytes(&bytes) {
        Ok(Request::Synchronize(request)) => Response::SynAck(handler.synchronize(request).await),
        Ok(Request::Acknowledge(request)) => {
            handler.acknowledge(request).await;
            Response::Empty
        }
        Err(e) => {
            tracing::warn!(remote = %remote, error = %e, "Rejecting undecodable request");
            Response::Rejected(e.to_string())
        }
    };

    let payload = response.to_bytes()?;
    timeout(config.message_timeout(), write_frame(&mut stream, &payload, limit))
        .await
        .map_err(|_| TransportError::Timeout(remote))?
}
