//! In-process ed25519 signer.
//!
//! Production deployments plug a custody service in behind
//! [`TransactionSigner`]; this implementation holds the key in memory and is
//! meant for local networks and tests.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey};
use pom_types::{AuditorId, Result, TxHash};
use rand::rngs::OsRng;

use crate::TransactionSigner;

pub struct Ed25519Signer {
    key: SigningKey,
    id: AuditorId,
}

impl Ed25519Signer {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        let id = AuditorId::from_verifying_key(&key.verifying_key());
        Self { key, id }
    }

    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }

    /// Fresh key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut OsRng))
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("id", &self.id.short())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionSigner for Ed25519Signer {
    fn id(&self) -> AuditorId {
        self.id
    }

    async fn sign(&self, hash: &TxHash) -> Result<Signature> {
        Ok(self.key.sign(&hash.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecoratedSignature;

    #[tokio::test]
    async fn signature_verifies_under_own_id() {
        let signer = Ed25519Signer::generate();
        let hash = TxHash([3u8; 32]);
        let sig = DecoratedSignature {
            signer: signer.id(),
            signature: signer.sign(&hash).await.unwrap(),
        };
        assert!(sig.verify(&hash).is_ok());
        assert!(sig.verify(&TxHash([4u8; 32])).is_err());
    }

    #[test]
    fn seed_is_deterministic() {
        assert_eq!(
            Ed25519Signer::from_seed(&[1u8; 32]).id(),
            Ed25519Signer::from_seed(&[1u8; 32]).id()
        );
        assert_ne!(
            Ed25519Signer::from_seed(&[1u8; 32]).id(),
            Ed25519Signer::from_seed(&[2u8; 32]).id()
        );
    }

    #[test]
    fn debug_hides_key() {
        let s = format!("{:?}", Ed25519Signer::from_seed(&[1u8; 32]));
        assert!(s.contains("Ed25519Signer"));
        assert!(!s.contains("key"));
    }
}
