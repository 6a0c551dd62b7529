//! Epidemic (anti-entropy) gossip membership for peer-to-peer nodes.
//!
//! A node keeps a registry of every peer it has heard of and, on a fixed
//! tick, runs a SYN/ACK exchange with one random seed and one random known
//! peer. Remote records are merged by freshness; repeated rounds across the
//! network converge every node on the same membership view.

pub mod config;
pub mod identity;
pub mod membership;
pub mod node;
pub mod probe;
pub mod storage;
pub mod sync;
pub mod transport;

pub use config::{ConfigError, NodeConfig};
pub use node::{Collaborators, GossipNode, NodeError};
