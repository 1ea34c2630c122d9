//! In-memory directory fake with the real directory's semantics:
//! append-only bindings, device-ID uniqueness, typed duplicate reporting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{DirectoryClient, DirectoryError, RegisterOutcome};
use stc_crypto::PublicKey;

#[derive(Default)]
struct Inner {
    bindings: Mutex<HashMap<String, PublicKey>>,
    // Remaining injected transient failures, shared across clones.
    failures: AtomicU32,
}

/// Shared-state fake; clones observe the same bindings.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<Inner>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn failing_for(self, n: u32) -> Self {
        self.inner.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Insert a binding directly, bypassing the registration path.
    pub fn bind(&self, device_id: &str, public_key: &PublicKey) {
        self.inner.bindings.lock().insert(device_id.to_string(), *public_key);
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn register(
        &self,
        device_id: &str,
        public_key: &PublicKey,
    ) -> Result<RegisterOutcome, DirectoryError> {
        if self.take_failure() {
            return Err(DirectoryError::RegistrationFailed(
                "injected transient failure".to_string(),
            ));
        }
        if device_id.is_empty() {
            return Err(DirectoryError::Validation("deviceID is required".to_string()));
        }

        let mut bindings = self.inner.bindings.lock();
        if bindings.contains_key(device_id) {
            // Existing binding is never overwritten, matching the
            // directory's fixed-identity invariant.
            return Ok(RegisterOutcome::AlreadyRegistered);
        }
        bindings.insert(device_id.to_string(), *public_key);
        Ok(RegisterOutcome::Registered)
    }

    async fn lookup(&self, device_id: &str) -> Result<PublicKey, DirectoryError> {
        if self.take_failure() {
            return Err(DirectoryError::ReadFailed("injected transient failure".to_string()));
        }
        self.inner
            .bindings
            .lock()
            .get(device_id)
            .copied()
            .ok_or_else(|| DirectoryError::NotFound(device_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_crypto::{Kem, X25519Kem};

    #[tokio::test]
    async fn test_uniqueness_is_enforced() {
        let directory = InMemoryDirectory::new();
        let first = X25519Kem.generate();
        let second = X25519Kem.generate();

        assert_eq!(
            directory.register("D1", &first.public).await.unwrap(),
            RegisterOutcome::Registered
        );
        assert_eq!(
            directory.register("D1", &second.public).await.unwrap(),
            RegisterOutcome::AlreadyRegistered
        );

        let bound = directory.lookup("D1").await.unwrap();
        assert_eq!(bound.as_bytes(), first.public.as_bytes());
    }

    #[tokio::test]
    async fn test_clones_share_bindings() {
        let directory = InMemoryDirectory::new();
        let pair = X25519Kem.generate();

        let clone = directory.clone();
        clone.register("D1", &pair.public).await.unwrap();

        assert!(directory.lookup("D1").await.is_ok());
    }
}
