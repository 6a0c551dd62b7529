// Storage module - PERSISTENCE
// Snapshot of the membership view and node identity, kept in sled

mod store;

pub use store::{PeerStore, StorageStats, StoreError};
