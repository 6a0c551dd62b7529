// TCP transport tests against loopback listeners

use peergossip::identity::PeerKey;
use peergossip::membership::{Peer, PeerRegistry, Reconciler};
use peergossip::probe::MemoryNotifier;
use peergossip::sync::{encode_peers, PeerRecord, Response, SynRequest, SyncEngine};
use peergossip::transport::{
    read_frame, write_frame, GossipTransport, MemoryTransport, TcpServer, TcpTransport,
    TcpTransportConfig, TransportConfig, TransportError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

fn key(b: u8) -> PeerKey {
    PeerKey::from_bytes(vec![b; 32])
}

fn loopback() -> TcpTransportConfig {
    TcpTransportConfig::new()
        .with_bind_address("127.0.0.1")
        .with_bind_port(0)
        .with_base_config(
            TransportConfig::new()
                .with_connect_timeout_ms(500)
                .with_message_timeout_ms(200),
        )
}

/// Serve a fresh engine on loopback; returns its address and registry
async fn spawn_server(
    shutdown: watch::Receiver<bool>,
) -> (SocketAddr, PeerRegistry) {
    let server = TcpServer::bind(loopback()).await.unwrap();
    let local_addr = server.local_addr();
    let registry = PeerRegistry::new(Peer::new_self(key(2), local_addr, "1.0.0", 3));
    let reconciler = Reconciler::new(registry.clone(), Arc::new(MemoryNotifier::new()));
    let engine = Arc::new(SyncEngine::new(reconciler, Arc::new(MemoryTransport::new())));
    tokio::spawn(server.serve(engine, shutdown));
    (local_addr, registry)
}

#[tokio::test]
async fn test_synchronize_over_tcp() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (server_addr, registry) = spawn_server(shutdown_rx).await;

    let initiator = Peer::new(key(1), "127.0.0.1:7001".parse().unwrap());
    let request = SynRequest {
        initiator: PeerRecord::from(&initiator),
        receiver: PeerRecord::stub(server_addr),
        known_peers: encode_peers(&[initiator.clone()]),
    };

    let transport = TcpTransport::new(loopback());
    let syn_ack = transport.synchronize(server_addr, request).await.unwrap();

    assert_eq!(syn_ack.receiver.key(), key(2));
    assert_eq!(syn_ack.new_peers.len(), 1);
    assert_eq!(syn_ack.unknown_peers.len(), 1);
    assert_eq!(syn_ack.unknown_peers[0].key(), key(1));
    // SYN alone never inserts
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_garbage_request_rejected() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (server_addr, _registry) = spawn_server(shutdown_rx).await;

    let mut stream = TcpStream::connect(server_addr).await.unwrap();
    write_frame(&mut stream, &[0xff, 0xfe, 0xfd], 1024).await.unwrap();
    let bytes = read_frame(&mut stream, 1024).await.unwrap();

    assert!(matches!(
        Response::from_bytes(&bytes).unwrap(),
        Response::Rejected(_)
    ));
}

#[tokio::test]
async fn test_unresponsive_peer_times_out() {
    // Accepted by the OS backlog but never answered
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    let transport = TcpTransport::new(loopback());
    let request = SynRequest {
        initiator: PeerRecord::stub("127.0.0.1:7001".parse().unwrap()),
        receiver: PeerRecord::stub(target),
        known_peers: Vec::new(),
    };
    let result = transport.synchronize(target, request).await;

    assert!(matches!(result, Err(TransportError::Timeout(addr)) if addr == target));
    drop(listener);
}

#[tokio::test]
async fn test_closed_port_fails_to_connect() {
    let target = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let transport = TcpTransport::new(loopback());
    let request = SynRequest {
        initiator: PeerRecord::stub("127.0.0.1:7001".parse().unwrap()),
        receiver: PeerRecord::stub(target),
        known_peers: Vec::new(),
    };
    let result = transport.synchronize(target, request).await;

    assert!(matches!(
        result,
        Err(TransportError::ConnectionFailed(..)) | Err(TransportError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let server = TcpServer::bind(loopback()).await.unwrap();
    let local_addr = server.local_addr();
    let registry = PeerRegistry::new(Peer::new_self(key(2), local_addr, "1.0.0", 3));
    let reconciler = Reconciler::new(registry, Arc::new(MemoryNotifier::new()));
    let engine = Arc::new(SyncEngine::new(reconciler, Arc::new(MemoryTransport::new())));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(server.serve(engine, shutdown_rx));
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
