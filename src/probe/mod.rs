// Probe module - WHAT THE NODE ASKS THE OUTSIDE WORLD
// Collaborator interfaces consumed by the gossip core, plus fixed and
// logging implementations for the daemon and for tests

mod fixed;
mod notifier;
mod traits;

pub use fixed::{FixedGeoLocator, FixedMetricsProbe};
pub use notifier::{LoggingNotifier, MemoryNotifier};
pub use traits::{
    ConfigurationReader, DiscoveryNotifier, GeoLocator, GeoLookup, MetricsProbe, NotifyError,
    ProbeError,
};
