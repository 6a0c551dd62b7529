use clap::Parser;
use peergossip::identity::NodeKeypair;
use peergossip::storage::PeerStore;
use peergossip::sync::{FailurePolicy, GossipConfig};
use peergossip::transport::{TcpTransportConfig, TransportConfig};
use peergossip::{Collaborators, GossipNode, NodeConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gossipd", about = "Peer discovery daemon using epidemic gossip")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "7946")]
    port: u16,

    /// Seed peer (host:port), repeatable
    #[arg(long = "seed", required = true)]
    seeds: Vec<SocketAddr>,

    /// Replication fan-out hint advertised to peers
    #[arg(long, default_value = "3")]
    p2p_factor: u32,

    /// Version advertised to peers
    #[arg(long)]
    node_version: Option<String>,

    /// Gossip interval in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Per-call network timeout in milliseconds
    #[arg(long, default_value = "2000")]
    call_timeout_ms: u64,

    /// Upper bound for one gossip round in milliseconds
    #[arg(long, default_value = "10000")]
    round_timeout_ms: u64,

    /// Keep gossiping with the remaining targets when one fails
    #[arg(long, default_value = "false")]
    isolate_failures: bool,

    /// Hex encoded Ed25519 secret key
    #[arg(long, env = "GOSSIPD_SECRET_KEY")]
    secret_key: Option<String>,

    /// Directory for the identity and membership snapshot
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Public IP advertised to peers
    #[arg(long, default_value = "127.0.0.1")]
    public_ip: IpAddr,

    #[arg(long, default_value = "0")]
    lat: f32,

    #[arg(long, default_value = "0")]
    lon: f32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gossipd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = cli.data_dir.as_ref().map(PeerStore::open).transpose()?;

    let keypair = match (&cli.secret_key, &store) {
        (Some(hex), _) => NodeKeypair::from_hex(hex)?,
        (None, Some(store)) => store.get_or_create_keypair()?,
        (None, None) => NodeKeypair::generate(),
    };

    let failure_policy = if cli.isolate_failures {
        FailurePolicy::IsolateTargets
    } else {
        FailurePolicy::AbortRound
    };

    let transport = TcpTransportConfig::new()
        .with_bind_address(&cli.bind)
        .with_bind_port(cli.port)
        .with_base_config(
            TransportConfig::new()
                .with_connect_timeout_ms(cli.call_timeout_ms)
                .with_message_timeout_ms(cli.call_timeout_ms),
        );

    let gossip = GossipConfig::new()
        .with_interval_ms(cli.interval_ms)
        .with_round_timeout_ms(cli.round_timeout_ms)
        .with_failure_policy(failure_policy);

    let mut config = NodeConfig::new(keypair.peer_key())
        .with_seeds(cli.seeds)
        .with_p2p_factor(cli.p2p_factor)
        .with_gossip(gossip)
        .with_transport(transport);
    if let Some(version) = &cli.node_version {
        config = config.with_version(version);
    }

    let collaborators = Collaborators::fixed(cli.public_ip, cli.lat, cli.lon);
    let node = GossipNode::bootstrap(config, collaborators, store).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    node.run(shutdown_rx).await?;
    Ok(())
}
