//! Role-level error type.
//!
//! Everything here is a startup-path failure: fatal to the owning role
//! and visible to the operator. Steady-state per-message failures never
//! surface as `RoleError`; they are logged where they occur and the
//! loop continues.

use crate::keystore::KeyStoreError;
use stc_directory::DirectoryError;
use stc_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("key store failure: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("directory failure: {0}")]
    Directory(#[from] DirectoryError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}
