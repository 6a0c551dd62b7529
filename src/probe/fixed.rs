// Fixed Probes
// Probes that answer configured values. The daemon uses them when no
// external geolocation or metrics source is wired in.

use super::{GeoLocator, GeoLookup, MetricsProbe, ProbeError};
use crate::membership::PeerStatus;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Geolocator returning a fixed position
#[derive(Debug)]
pub struct FixedGeoLocator {
    lookup: GeoLookup,
    fail: AtomicBool,
}

impl FixedGeoLocator {
    pub fn new(ip: IpAddr, lat: f32, lon: f32) -> Self {
        Self {
            lookup: GeoLookup { ip, lat, lon },
            fail: AtomicBool::new(false),
        }
    }

    /// Make subsequent lookups fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GeoLocator for FixedGeoLocator {
    async fn lookup(&self) -> Result<GeoLookup, ProbeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProbeError::GeoLookupFailed("lookup disabled".to_string()));
        }
        Ok(self.lookup)
    }
}

/// Metrics probe returning fixed readings
#[derive(Clone, Debug)]
pub struct FixedMetricsProbe {
    status: PeerStatus,
    cpu_load: f32,
    free_disk_space: f32,
    io_wait_rate: f32,
}

impl Default for FixedMetricsProbe {
    fn default() -> Self {
        Self {
            status: PeerStatus::Ok,
            cpu_load: 0.0,
            free_disk_space: 0.0,
            io_wait_rate: 0.0,
        }
    }
}

impl FixedMetricsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: PeerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_cpu_load(mut self, cpu_load: f32) -> Self {
        self.cpu_load = cpu_load;
        self
    }

    pub fn with_free_disk_space(mut self, free_disk_space: f32) -> Self {
        self.free_disk_space = free_disk_space;
        self
    }

    pub fn with_io_wait_rate(mut self, io_wait_rate: f32) -> Self {
        self.io_wait_rate = io_wait_rate;
        self
    }
}

#[async_trait]
impl MetricsProbe for FixedMetricsProbe {
    async fn status(&self) -> Result<PeerStatus, ProbeError> {
        Ok(self.status)
    }

    async fn cpu_load(&self) -> Result<f32, ProbeError> {
        Ok(self.cpu_load)
    }

    async fn free_disk_space(&self) -> Result<f32, ProbeError> {
        Ok(self.free_disk_space)
    }

    async fn io_wait_rate(&self) -> Result<f32, ProbeError> {
        Ok(self.io_wait_rate)
    }
}
