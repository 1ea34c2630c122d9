//! Idempotent registration and peer resolution.
//!
//! Devices may restart and re-run registration indefinitely: a duplicate
//! registration is success, because the directory already holds this
//! identity. Everything else on the startup path is fatal once the retry
//! budget is spent.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::client::{DirectoryClient, DirectoryError, RegisterOutcome};
use stc_crypto::PublicKey;

/// Bounded retry with doubling backoff for startup-path directory calls.
///
/// Whether peer resolution retries at all is a deployment decision, so
/// both budgets are configuration, not hard-coded behavior.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Minimum 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt after that.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn once() -> Self {
        Self { max_attempts: 1, initial_backoff: Duration::ZERO }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        // attempt is 1-based; backoff doubles after each failure.
        self.initial_backoff.saturating_mul(1 << attempt.saturating_sub(1).min(16))
    }
}

/// Drives registration and peer-key resolution against a directory client.
pub struct RegistrationCoordinator<D: DirectoryClient> {
    directory: D,
    register_policy: RetryPolicy,
    lookup_policy: RetryPolicy,
}

impl<D: DirectoryClient> RegistrationCoordinator<D> {
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            register_policy: RetryPolicy::default(),
            lookup_policy: RetryPolicy::once(),
        }
    }

    pub fn with_policies(directory: D, register: RetryPolicy, lookup: RetryPolicy) -> Self {
        Self { directory, register_policy: register, lookup_policy: lookup }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Register this device's identity, treating an existing binding as
    /// success. A validation failure is never retried; other failures
    /// consume the retry budget and then abort the caller's startup.
    pub async fn ensure_registered(
        &self,
        device_id: &str,
        public_key: &PublicKey,
    ) -> Result<(), DirectoryError> {
        let mut attempt = 1u32;
        loop {
            match self.directory.register(device_id, public_key).await {
                Ok(RegisterOutcome::Registered) => {
                    info!(device_id, "registered with directory");
                    return Ok(());
                }
                Ok(RegisterOutcome::AlreadyRegistered) => {
                    info!(device_id, "already registered, proceeding");
                    return Ok(());
                }
                Err(e @ DirectoryError::Validation(_)) => return Err(e),
                Err(e) if attempt < self.register_policy.max_attempts => {
                    let backoff = self.register_policy.backoff_for(attempt);
                    warn!(device_id, attempt, error = %e, "registration failed, retrying");
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve a peer's public key. `NotFound` consumes the lookup retry
    /// budget (the peer may not have registered yet); with the default
    /// single-attempt policy it is immediately fatal.
    pub async fn resolve_peer(&self, peer_id: &str) -> Result<PublicKey, DirectoryError> {
        let mut attempt = 1u32;
        loop {
            match self.directory.lookup(peer_id).await {
                Ok(key) => {
                    info!(peer_id, "resolved peer public key");
                    return Ok(key);
                }
                Err(e) if attempt < self.lookup_policy.max_attempts => {
                    let backoff = self.lookup_policy.backoff_for(attempt);
                    warn!(peer_id, attempt, error = %e, "peer lookup failed, retrying");
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
