//! Cryptographic operations for the credit ledger
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - The canonical attestation digest consumed by direct attestations
//!
//! The attestation digest is an explicit, domain-separated field encoding
//! rather than a serde serialization, so signed messages stay stable across
//! library versions.

use crate::types::{AccountId, Signature};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

/// Domain separation tag for attestation digests
const ATTESTATION_DOMAIN: &[u8] = b"sequestra.attestation.v1";

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&rand::random::<[u8; 32]>()),
        }
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The ledger identity for this key: its verifying-key bytes
    pub fn account_id(&self) -> AccountId {
        AccountId::new(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }
}

/// Canonical digest an auditor signs to approve an MRV claim.
///
/// Binds the MRV, project, auditor identity, quantity, the auditor's
/// current nonce (replay protection), and the signature deadline under a
/// fixed domain tag. Variable-length fields are length-prefixed so field
/// boundaries cannot shift.
pub fn attestation_digest(
    mrv_id: &str,
    project_id: &str,
    auditor: &AccountId,
    t_co2e: u64,
    nonce: u64,
    deadline: DateTime<Utc>,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ATTESTATION_DOMAIN);
    hasher.update((mrv_id.len() as u64).to_be_bytes());
    hasher.update(mrv_id.as_bytes());
    hasher.update((project_id.len() as u64).to_be_bytes());
    hasher.update(project_id.as_bytes());
    hasher.update(auditor.as_bytes());
    hasher.update(t_co2e.to_be_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(deadline.timestamp().to_be_bytes());
    hasher.finalize().into()
}

/// Verify a signature over a message against an account's verifying key
pub fn verify_signature(message: &[u8], signature: &Signature, signer: &AccountId) -> bool {
    signature.verify(message, signer.as_bytes())
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_from_seed_is_deterministic() {
        let seed = [42u8; 32];
        let first = KeyPair::from_seed(&seed);
        let second = KeyPair::from_seed(&seed);
        assert_eq!(first.account_id(), second.account_id());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"test message";

        let signature = keypair.sign(message);
        assert!(verify_signature(message, &signature, &keypair.account_id()));

        let wrong_signer = KeyPair::generate();
        assert!(!verify_signature(
            message,
            &signature,
            &wrong_signer.account_id()
        ));
    }

    #[test]
    fn test_attestation_digest_binds_every_field() {
        let auditor = KeyPair::from_seed(&[7u8; 32]).account_id();
        let deadline = Utc::now();
        let base = attestation_digest("M1", "P1", &auditor, 100, 0, deadline);

        assert_ne!(
            base,
            attestation_digest("M2", "P1", &auditor, 100, 0, deadline)
        );
        assert_ne!(
            base,
            attestation_digest("M1", "P2", &auditor, 100, 0, deadline)
        );
        assert_ne!(
            base,
            attestation_digest("M1", "P1", &auditor, 101, 0, deadline)
        );
        assert_ne!(
            base,
            attestation_digest("M1", "P1", &auditor, 100, 1, deadline)
        );
        assert_eq!(
            base,
            attestation_digest("M1", "P1", &auditor, 100, 0, deadline)
        );
    }

    #[test]
    fn test_digest_field_boundaries_cannot_shift() {
        let auditor = KeyPair::from_seed(&[7u8; 32]).account_id();
        let deadline = Utc::now();

        // "AB" + "C" must not collide with "A" + "BC".
        assert_ne!(
            attestation_digest("AB", "C", &auditor, 1, 0, deadline),
            attestation_digest("A", "BC", &auditor, 1, 0, deadline)
        );
    }

    #[test]
    fn test_hash_bytes() {
        let first = hash_bytes(b"data");
        let second = hash_bytes(b"data");
        assert_eq!(first, second);
        assert_ne!(first, hash_bytes(b"other"));
    }
}
