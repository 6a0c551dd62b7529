// Self-Refresh - Rebuild our own peer snapshot before each round
//
// Every outgoing SYN carries a freshly generated self record, so the rest of
// the network sees us as fresher than any copy of us it already stores.

use crate::membership::{GeoPosition, Peer, PeerRegistry, PeerState};
use crate::probe::{ConfigurationReader, GeoLocator, MetricsProbe, ProbeError};
use std::net::SocketAddr;
use std::sync::Arc;

pub struct SelfRefresher {
    registry: PeerRegistry,
    config: Arc<dyn ConfigurationReader>,
    geo: Arc<dyn GeoLocator>,
    metrics: Arc<dyn MetricsProbe>,
}

impl SelfRefresher {
    pub fn new(
        registry: PeerRegistry,
        config: Arc<dyn ConfigurationReader>,
        geo: Arc<dyn GeoLocator>,
        metrics: Arc<dyn MetricsProbe>,
    ) -> Self {
        Self {
            registry,
            config,
            geo,
            metrics,
        }
    }

    /// Probe everything and write the new self record back
    ///
    /// On a probe failure, or if the registry refuses the new record, the
    /// stored self record is left untouched.
    pub async fn refresh(&self) -> Result<Peer, ProbeError> {
        let location = self.geo.lookup().await?;

        let state = PeerState {
            status: self.metrics.status().await?,
            version: self.config.version(),
            geo: GeoPosition::new(location.lat, location.lon),
            p2p_factor: self.config.p2p_factor(),
            cpu_load: self.metrics.cpu_load().await?,
            io_wait_rate: self.metrics.io_wait_rate().await?,
            free_disk_space: self.metrics.free_disk_space().await?,
        };

        let address = SocketAddr::new(location.ip, self.config.port());
        let owned = Peer::new_self(
            self.config.public_key(),
            address,
            &state.version,
            state.p2p_factor,
        )
        .with_state(state);

        self.registry.update_peer(owned.clone()).await?;

        tracing::trace!(peer = %owned.key(), addr = %address, "Refreshed self record");
        Ok(owned)
    }
}
