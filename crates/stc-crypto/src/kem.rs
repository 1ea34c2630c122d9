//! Key encapsulation for per-message shared secrets.
//!
//! The capsule carries an ephemeral X25519 public key plus a short
//! confirmation tag; both sides derive the same 32-byte secret via
//! HKDF-SHA256 over the Diffie-Hellman output, bound to the ephemeral
//! and recipient public keys.

use constant_time_eq::constant_time_eq;
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an encoded public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of the confirmation tag appended to every capsule.
pub const CONFIRM_TAG_LEN: usize = 16;
/// Total encoded capsule length: ephemeral public key || confirmation tag.
pub const CAPSULE_LEN: usize = PUBLIC_KEY_LEN + CONFIRM_TAG_LEN;

/// Error type for encapsulation and decapsulation.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed capsule: expected {expected} bytes, got {got}")]
    MalformedCapsule { expected: usize, got: usize },
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("capsule does not correspond to this private key")]
    CapsuleMismatch,
}

/// A device's public encryption key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LEN,
                got: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short fingerprint, never the full key, in logs.
        let digest = Sha256::digest(self.0);
        write!(f, "PublicKey({:02x}{:02x}{:02x}{:02x})", digest[0], digest[1], digest[2], digest[3])
    }
}

/// A device's private encryption key. Never leaves the process; the
/// underlying scalar is zeroized on drop by `StaticSecret`.
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LEN,
                got: bytes.len(),
            })?;
        Ok(Self(StaticSecret::from(arr)))
    }

    /// Raw key bytes for persistence. Callers own the key file contract.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(*X25519PublicKey::from(&self.0).as_bytes())
    }
}

/// A device's persistent key pair.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// Ephemeral shared secret recovered identically by encapsulation and
/// decapsulation. Never persisted, never transmitted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Opaque encapsulation output, bound to one recipient key and one
/// freshly generated secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capsule(Vec<u8>);

impl Capsule {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != CAPSULE_LEN {
            return Err(CryptoError::MalformedCapsule {
                expected: CAPSULE_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

/// The key-encapsulation capability consumed by the protocol.
///
/// Roles and the hybrid cipher depend on this trait, not on a concrete
/// primitive, so tests can substitute deterministic fakes.
pub trait Kem: Send + Sync {
    /// Generate a fresh key pair.
    fn generate(&self) -> KeyPair;

    /// Produce a capsule and a freshly generated shared secret for the
    /// recipient. A new secret is generated on every call.
    fn encapsulate(&self, recipient: &PublicKey) -> Result<(Capsule, SharedSecret), CryptoError>;

    /// Recover the shared secret from a capsule using the matching
    /// private key.
    fn decapsulate(&self, capsule: &Capsule, private: &PrivateKey)
        -> Result<SharedSecret, CryptoError>;
}

/// Default KEM: ephemeral X25519 + HKDF-SHA256 with key confirmation.
#[derive(Clone, Copy, Debug, Default)]
pub struct X25519Kem;

/// Derive the shared secret and confirmation tag from the DH output,
/// bound to the ephemeral and recipient public keys via the HKDF salt.
fn derive_secret_and_tag(
    dh: &[u8; 32],
    eph_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> ([u8; 32], [u8; CONFIRM_TAG_LEN]) {
    let mut hasher = Sha256::new();
    hasher.update(eph_pub);
    hasher.update(recipient_pub);
    let salt = hasher.finalize();

    let hk = Hkdf::<Sha256>::new(Some(&salt), dh);

    let mut secret = [0u8; 32];
    hk.expand(b"stc_kem_v1_secret", &mut secret).unwrap(); // Output size matches digest size, infallible

    let mut tag = [0u8; CONFIRM_TAG_LEN];
    hk.expand(b"stc_kem_v1_confirm", &mut tag).unwrap(); // Output size < digest size, infallible

    (secret, tag)
}

impl Kem for X25519Kem {
    fn generate(&self) -> KeyPair {
        let private = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(*X25519PublicKey::from(&private).as_bytes());
        KeyPair { public, private: PrivateKey(private) }
    }

    fn encapsulate(&self, recipient: &PublicKey) -> Result<(Capsule, SharedSecret), CryptoError> {
        let eph = EphemeralSecret::random_from_rng(OsRng);
        let eph_pub = X25519PublicKey::from(&eph);

        let recip_pub = X25519PublicKey::from(*recipient.as_bytes());
        let shared = eph.diffie_hellman(&recip_pub);

        let (secret, tag) =
            derive_secret_and_tag(shared.as_bytes(), eph_pub.as_bytes(), recipient.as_bytes());

        let mut capsule = Vec::with_capacity(CAPSULE_LEN);
        capsule.extend_from_slice(eph_pub.as_bytes());
        capsule.extend_from_slice(&tag);

        Ok((Capsule(capsule), SharedSecret(secret)))
    }

    fn decapsulate(
        &self,
        capsule: &Capsule,
        private: &PrivateKey,
    ) -> Result<SharedSecret, CryptoError> {
        if capsule.0.len() != CAPSULE_LEN {
            return Err(CryptoError::MalformedCapsule {
                expected: CAPSULE_LEN,
                got: capsule.0.len(),
            });
        }

        let eph_pub_bytes: [u8; PUBLIC_KEY_LEN] = capsule.0[..PUBLIC_KEY_LEN]
            .try_into()
            .map_err(|_| CryptoError::CapsuleMismatch)?;
        let eph_pub = X25519PublicKey::from(eph_pub_bytes);

        let shared = private.0.diffie_hellman(&eph_pub);
        let my_pub = private.public();

        let (secret, tag) =
            derive_secret_and_tag(shared.as_bytes(), &eph_pub_bytes, my_pub.as_bytes());

        // The confirmation tag is what turns a capsule for someone else,
        // or a tampered capsule, into a typed failure rather than a
        // silently wrong secret.
        if !constant_time_eq(&tag, &capsule.0[PUBLIC_KEY_LEN..]) {
            return Err(CryptoError::CapsuleMismatch);
        }

        Ok(SharedSecret(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encapsulate_decapsulate_round_trip() {
        let kem = X25519Kem;
        let pair = kem.generate();

        let (capsule, sender_secret) = kem.encapsulate(&pair.public).unwrap();
        let recipient_secret = kem.decapsulate(&capsule, &pair.private).unwrap();

        assert_eq!(sender_secret.as_bytes(), recipient_secret.as_bytes());
    }

    #[test]
    fn test_fresh_secret_every_call() {
        let kem = X25519Kem;
        let pair = kem.generate();

        let (capsule1, secret1) = kem.encapsulate(&pair.public).unwrap();
        let (capsule2, secret2) = kem.encapsulate(&pair.public).unwrap();

        assert_ne!(capsule1, capsule2);
        assert_ne!(secret1.as_bytes(), secret2.as_bytes());
    }

    #[test]
    fn test_wrong_private_key_fails() {
        let kem = X25519Kem;
        let alice = kem.generate();
        let bob = kem.generate();

        let (capsule, _) = kem.encapsulate(&alice.public).unwrap();

        assert!(matches!(
            kem.decapsulate(&capsule, &bob.private),
            Err(CryptoError::CapsuleMismatch)
        ));
    }

    #[test]
    fn test_tampered_capsule_fails() {
        let kem = X25519Kem;
        let pair = kem.generate();

        let (capsule, _) = kem.encapsulate(&pair.public).unwrap();
        let mut bytes = capsule.into_vec();
        bytes[0] ^= 0x01;
        let tampered = Capsule::from_bytes(&bytes).unwrap();

        assert!(kem.decapsulate(&tampered, &pair.private).is_err());
    }

    #[test]
    fn test_truncated_capsule_is_malformed() {
        assert!(matches!(
            Capsule::from_bytes(&[0u8; 12]),
            Err(CryptoError::MalformedCapsule { expected: CAPSULE_LEN, got: 12 })
        ));
    }

    #[test]
    fn test_private_key_round_trips_through_bytes() {
        let kem = X25519Kem;
        let pair = kem.generate();

        let restored = PrivateKey::from_bytes(&pair.private.to_bytes()).unwrap();
        assert_eq!(restored.public().as_bytes(), pair.public.as_bytes());
    }

    #[test]
    fn test_public_key_rejects_bad_length() {
        assert!(PublicKey::from_bytes(&[0u8; 31]).is_err());
        assert!(PublicKey::from_bytes(&[0u8; 33]).is_err());
        assert!(PublicKey::from_bytes(&[0u8; 32]).is_ok());
    }
}
