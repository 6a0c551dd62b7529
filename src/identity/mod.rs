// Identity module - WHO WE ARE
// Node keypair management and the opaque peer key used as membership identity

mod key;
mod keypair;

pub use key::PeerKey;
pub use keypair::{KeypairError, NodeKeypair};
