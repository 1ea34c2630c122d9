//! Hybrid cipher: per-message key encapsulation plus keystream payload
//! protection.
//!
//! One asymmetric call per message bounds the expensive operation;
//! payload encryption stays cheap. The keystream layer carries NO
//! integrity tag: tampering with the ciphertext body is undetectable
//! at this layer and must be addressed before production use. Capsule
//! tampering is caught by the KEM's key confirmation.

use crate::envelope::Envelope;
use crate::kem::{Capsule, CryptoError, Kem, PrivateKey, PublicKey, X25519Kem};
use crate::stream::keystream_xor;

/// Encrypts for a recipient public key and decrypts with the local
/// private key, generating a fresh capsule/secret pair per message.
pub struct HybridCipher<K: Kem = X25519Kem> {
    kem: K,
}

impl HybridCipher<X25519Kem> {
    pub fn new() -> Self {
        Self { kem: X25519Kem }
    }
}

impl Default for HybridCipher<X25519Kem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kem> HybridCipher<K> {
    pub fn with_kem(kem: K) -> Self {
        Self { kem }
    }

    pub fn kem(&self) -> &K {
        &self.kem
    }

    /// Seal `plaintext` to the recipient. Every call generates a new
    /// capsule and secret; identical inputs never produce identical
    /// envelopes.
    pub fn encrypt_for_recipient(
        &self,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<Envelope, CryptoError> {
        let (capsule, secret) = self.kem.encapsulate(recipient)?;
        let ciphertext = keystream_xor(secret.as_bytes(), plaintext);
        Ok(Envelope { capsule: capsule.into_vec(), ciphertext, sent_at: None })
    }

    /// Recover the plaintext from an envelope using the matching private
    /// key. Fails with `CryptoError` when the capsule is malformed or
    /// was sealed to a different key pair.
    pub fn decrypt_with_private_key(
        &self,
        private: &PrivateKey,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, CryptoError> {
        let capsule = Capsule::from_bytes(&envelope.capsule)?;
        let secret = self.kem.decapsulate(&capsule, private)?;
        Ok(keystream_xor(secret.as_bytes(), &envelope.ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = HybridCipher::new();
        let pair = cipher.kem().generate();
        let plaintext = br#"{"lat":34.05,"lon":-118.24}"#;

        let env = cipher.encrypt_for_recipient(&pair.public, plaintext).unwrap();
        let recovered = cipher.decrypt_with_private_key(&pair.private, &env).unwrap();

        assert_eq!(recovered.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_freshness_identical_inputs_differ() {
        let cipher = HybridCipher::new();
        let pair = cipher.kem().generate();
        let plaintext = b"same payload";

        let env1 = cipher.encrypt_for_recipient(&pair.public, plaintext).unwrap();
        let env2 = cipher.encrypt_for_recipient(&pair.public, plaintext).unwrap();

        assert_ne!(env1.capsule, env2.capsule);
        assert_ne!(env1.ciphertext, env2.ciphertext);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let cipher = HybridCipher::new();
        let alice = cipher.kem().generate();
        let bob = cipher.kem().generate();

        let env = cipher.encrypt_for_recipient(&alice.public, b"for alice").unwrap();
        assert!(cipher.decrypt_with_private_key(&bob.private, &env).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = HybridCipher::new();
        let pair = cipher.kem().generate();

        let env = cipher.encrypt_for_recipient(&pair.public, b"").unwrap();
        assert!(env.ciphertext.is_empty());
        assert!(cipher.decrypt_with_private_key(&pair.private, &env).unwrap().is_empty());
    }
}
