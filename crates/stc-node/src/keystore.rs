//! Persistent key-pair lifecycle.
//!
//! A device's key pair is generated once and persisted to a local JSON
//! file; while that file is readable and parseable it IS the device's
//! identity. A present-but-corrupt file is a hard failure requiring
//! operator intervention: silently regenerating would desynchronize the
//! device from whatever key the directory already binds for it.
//!
//! The private key is stored in plaintext at rest, a known weakness
//! not solved here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;

use stc_crypto::{Kem, KeyPair, PrivateKey, PublicKey};
use stc_metrics::{time_sync, Metric, MetricsRecorder};

/// Error type for key persistence.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// The key file exists but cannot be parsed as one. Never recovered
    /// automatically.
    #[error("key file at {path} is unreadable or corrupt: {detail}")]
    Persistence { path: PathBuf, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk key file format: both keys, base64-encoded.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "privateKey")]
    private_key: String,
}

pub struct KeyStore;

impl KeyStore {
    /// Load the key pair persisted at `path`, or generate and persist a
    /// fresh one if no file exists. Exactly one file write on first
    /// call, none thereafter; repeated calls against the same file
    /// return bit-identical key pairs.
    pub async fn load_or_create<K: Kem>(
        path: &Path,
        kem: &K,
        metrics: &MetricsRecorder,
    ) -> Result<KeyPair, KeyStoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let pair = Self::decode(path, &content)?;
                info!(path = %path.display(), "loaded existing key pair");
                Ok(pair)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no key file, generating new key pair");
                let (pair, elapsed_ms) = time_sync(|| kem.generate());
                metrics.record(Metric::KeyGeneration, elapsed_ms);

                let encoded = serde_json::to_string_pretty(&KeyFile {
                    public_key: BASE64.encode(pair.public.as_bytes()),
                    private_key: BASE64.encode(pair.private.to_bytes()),
                })
                .expect("key file serialization is infallible");
                tokio::fs::write(path, encoded).await?;

                Ok(pair)
            }
            Err(e) => Err(KeyStoreError::Io(e)),
        }
    }

    fn decode(path: &Path, content: &str) -> Result<KeyPair, KeyStoreError> {
        let persist = |detail: String| KeyStoreError::Persistence {
            path: path.to_path_buf(),
            detail,
        };

        let file: KeyFile = serde_json::from_str(content).map_err(|e| persist(e.to_string()))?;

        let public_bytes = BASE64
            .decode(file.public_key.as_bytes())
            .map_err(|e| persist(format!("publicKey: {}", e)))?;
        let private_bytes = BASE64
            .decode(file.private_key.as_bytes())
            .map_err(|e| persist(format!("privateKey: {}", e)))?;

        let public = PublicKey::from_bytes(&public_bytes).map_err(|e| persist(e.to_string()))?;
        let private = PrivateKey::from_bytes(&private_bytes).map_err(|e| persist(e.to_string()))?;

        // A mismatched pair is as corrupt as an unparseable file.
        if private.public().as_bytes() != public.as_bytes() {
            return Err(persist("publicKey does not match privateKey".to_string()));
        }

        Ok(KeyPair { public, private })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_crypto::X25519Kem;

    #[tokio::test]
    async fn test_generates_and_persists_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-keys.json");

        let first = KeyStore::load_or_create(&path, &X25519Kem, &MetricsRecorder::disabled())
            .await
            .unwrap();
        assert!(path.exists());

        let second = KeyStore::load_or_create(&path, &X25519Kem, &MetricsRecorder::disabled())
            .await
            .unwrap();

        // Bit-identical on every subsequent call: no regeneration.
        assert_eq!(first.public.as_bytes(), second.public.as_bytes());
        assert_eq!(first.private.to_bytes(), second.private.to_bytes());
    }

    #[tokio::test]
    async fn test_key_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-keys.json");

        KeyStore::load_or_create(&path, &X25519Kem, &MetricsRecorder::disabled())
            .await
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json.get("publicKey").is_some());
        assert!(json.get("privateKey").is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(&path, "not json at all").unwrap();

        let result =
            KeyStore::load_or_create(&path, &X25519Kem, &MetricsRecorder::disabled()).await;
        assert!(matches!(result, Err(KeyStoreError::Persistence { .. })));

        // The corrupt file is left untouched for the operator.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json at all");
    }

    #[tokio::test]
    async fn test_bad_base64_is_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(&path, r#"{"publicKey":"!!!","privateKey":"???"}"#).unwrap();

        let result =
            KeyStore::load_or_create(&path, &X25519Kem, &MetricsRecorder::disabled()).await;
        assert!(matches!(result, Err(KeyStoreError::Persistence { .. })));
    }

    #[tokio::test]
    async fn test_mismatched_pair_is_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-keys.json");

        let a = X25519Kem.generate();
        let b = X25519Kem.generate();
        let content = serde_json::json!({
            "publicKey": BASE64.encode(a.public.as_bytes()),
            "privateKey": BASE64.encode(b.private.to_bytes()),
        });
        std::fs::write(&path, content.to_string()).unwrap();

        let result =
            KeyStore::load_or_create(&path, &X25519Kem, &MetricsRecorder::disabled()).await;
        assert!(matches!(result, Err(KeyStoreError::Persistence { .. })));
    }
}
