#![forbid(unsafe_code)]

//! Device-side hybrid encryption for the secure telemetry channel.
//!
//! The expensive asymmetric step (key encapsulation) runs once per message
//! and yields a single-use shared secret; the payload itself is protected
//! by a cheap keystream cipher derived from that secret. The capsule is
//! the only asymmetric artifact that crosses the wire.

pub mod kem;
pub mod stream;
pub mod envelope;
pub mod hybrid;

#[cfg(test)]
mod proptests;

pub use envelope::Envelope;
pub use hybrid::HybridCipher;
pub use kem::{Capsule, CryptoError, Kem, KeyPair, PrivateKey, PublicKey, SharedSecret, X25519Kem};
