//! Directory client trait and error taxonomy.

use async_trait::async_trait;
use stc_crypto::PublicKey;

/// Error type for directory operations.
///
/// "Already registered" is NOT represented here; it is a success case
/// carried by [`RegisterOutcome`], so callers branch on a discriminated
/// value instead of matching a detail string.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Malformed registration request, caller's fault. Not retried.
    #[error("invalid registration request: {0}")]
    Validation(String),
    /// The directory write failed for a reason other than duplication.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),
    /// No public key is bound to the requested device ID.
    #[error("device not found: {0}")]
    NotFound(String),
    /// The directory read failed before resolving presence.
    #[error("directory read failed: {0}")]
    ReadFailed(String),
    /// Transport-level failure reaching the gateway.
    #[error("http error: {0}")]
    Http(String),
    /// The gateway answered with bytes that do not fit its contract.
    #[error("bad response: {0}")]
    BadResponse(String),
}

/// Result of a registration write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The directory accepted a new binding.
    Registered,
    /// The device ID is already bound; the write was a duplicate.
    AlreadyRegistered,
}

/// Device-side view of the identity directory.
///
/// `register` submits a write and may block on the directory's write
/// path; `lookup` is read-only and never does.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Bind `public_key` to `device_id`. Duplicate submissions are
    /// reported as [`RegisterOutcome::AlreadyRegistered`], distinct from
    /// every failure case.
    async fn register(
        &self,
        device_id: &str,
        public_key: &PublicKey,
    ) -> Result<RegisterOutcome, DirectoryError>;

    /// Resolve the public key bound to `device_id`. Returns
    /// [`DirectoryError::NotFound`] when nothing is bound.
    async fn lookup(&self, device_id: &str) -> Result<PublicKey, DirectoryError>;
}
