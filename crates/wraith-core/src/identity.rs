//! Static long-term identity for a device.
//!
//! Trimmed from the teacher's `node::identity::Identity`: that type paired
//! an Ed25519 signing key (node identification) with an X25519 keypair
//! (Noise handshakes). Peers here are identified solely by their static
//! X25519 public key, so only that half survives.

use wraith_crypto::noise::NoiseKeypair;

/// The device's static long-term X25519 identity.
#[derive(Clone)]
pub struct StaticIdentity {
    keypair: NoiseKeypair,
}

impl StaticIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> crate::error::Result<Self> {
        let keypair = NoiseKeypair::generate()
            .map_err(|e| crate::error::CoreError::Handshake(e.to_string()))?;
        Ok(Self { keypair })
    }

    /// Restore an identity from a raw private key.
    pub fn from_private_key(private: [u8; 32]) -> crate::error::Result<Self> {
        let keypair = NoiseKeypair::from_bytes(private)
            .map_err(|e| crate::error::CoreError::Handshake(e.to_string()))?;
        Ok(Self { keypair })
    }

    /// The static public key, used as the peer lookup key on the remote side.
    pub fn public_key(&self) -> &[u8; 32] {
        self.keypair.public_key()
    }

    /// The underlying Noise keypair, as consumed by the handshake collaborator.
    pub fn keypair(&self) -> &NoiseKeypair {
        &self.keypair
    }
}

impl std::fmt::Debug for StaticIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIdentity")
            .field("public_key", &hex::encode(&self.keypair.public_key()[..8]))
            .finish()
    }
}
