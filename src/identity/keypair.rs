// Node Keypair - Ed25519 identity of the local node
//
// The verifying key becomes the self peer's PeerKey. The secret key can be
// supplied as hex so a node keeps its identity across restarts.

use super::PeerKey;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeypairError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid key encoding: {0}")]
    InvalidEncoding(String),
}

/// Ed25519 keypair of the local node
#[derive(Clone)]
pub struct NodeKeypair {
    signing_key: SigningKey,
}

impl NodeKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore a keypair from its 32 secret key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let bytes_array: [u8; 32] =
            bytes
                .try_into()
                .map_err(|_| KeypairError::InvalidLength {
                    expected: 32,
                    got: bytes.len(),
                })?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes_array),
        })
    }

    /// Restore a keypair from a hex encoded secret key
    pub fn from_hex(s: &str) -> Result<Self, KeypairError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeypairError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// The public key as a membership identity
    pub fn peer_key(&self) -> PeerKey {
        PeerKey::from_bytes(self.signing_key.verifying_key().as_bytes().to_vec())
    }

    /// Secret key bytes (for backup/restore)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}
