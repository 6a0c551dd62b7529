// Membership module - WHO IS OUT THERE
// Peer model, the registry holding the local membership view, freshness
// reconciliation, and target selection

mod peer;
mod reconcile;
mod registry;
mod selector;

pub use peer::{GeoPosition, Peer, PeerState, PeerStatus, SeedPeer};
pub use reconcile::{supersedes, ReconcileReport, Reconciler};
pub use registry::{MergeOutcome, PeerError, PeerRegistry, RegistryStats};
pub use selector::{select_one, FixedSelector, PeerSelector, RandomSelector};
